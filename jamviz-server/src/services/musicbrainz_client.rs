//! MusicBrainz artist search
//!
//! Genres come from the artist's community tags: most-voted first, top ten,
//! lowercased.

use super::{http_client, RateLimiter};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const MUSICBRAINZ_BASE_URL: &str = "https://musicbrainz.org/ws/2";
/// 1 request per second
const RATE_LIMIT: Duration = Duration::from_millis(1000);
const MAX_GENRES: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct MbArtistSearch {
    #[serde(default)]
    pub artists: Vec<MbArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MbArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<MbTag>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MbTag {
    #[serde(default)]
    pub count: i64,
    pub name: Option<String>,
}

impl MbArtist {
    /// Tag names by descending vote count
    pub fn genres(&self) -> Vec<String> {
        let mut tags: Vec<&MbTag> = self.tags.iter().collect();
        tags.sort_by(|a, b| b.count.cmp(&a.count));
        tags.into_iter()
            .take(MAX_GENRES)
            .filter_map(|t| t.name.as_deref())
            .filter(|n| !n.is_empty())
            .map(str::to_lowercase)
            .collect()
    }
}

pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
    base_url: String,
}

impl MusicBrainzClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: http_client(timeout)?,
            rate_limiter: RateLimiter::new(RATE_LIMIT),
            base_url: MUSICBRAINZ_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Best artist match for `name`
    pub async fn search_artist(&self, name: &str) -> Result<Option<MbArtist>> {
        self.rate_limiter.wait().await;

        let url = format!("{}/artist", self.base_url);
        let query = format!("artist:\"{}\"", name.replace('"', ""));
        debug!(artist = %name, "Querying MusicBrainz artist search");

        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&[("query", query.as_str()), ("fmt", "json"), ("limit", "1")])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::SERVICE_UNAVAILABLE {
            return Err(Error::Internal("MusicBrainz rate limit exceeded".to_string()));
        }
        let search: MbArtistSearch = response.error_for_status()?.json().await?;
        Ok(search.artists.into_iter().next())
    }

    /// Genre tags for `name`; empty when the artist is unknown
    pub async fn artist_genres(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .search_artist(name)
            .await?
            .map(|artist| artist.genres())
            .unwrap_or_default())
    }
}
