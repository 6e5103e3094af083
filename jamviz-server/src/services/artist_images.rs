//! Artist imagery: TheAudioDB first, Wikipedia page image as fallback
//!
//! Results, including empty ones, are cached in memory per artist name.

use super::http_client;
use crate::error::Result;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const AUDIODB_BASE_URL: &str = "https://www.theaudiodb.com/api/v1/json/2";
const WIKIPEDIA_API_URL: &str = "https://en.wikipedia.org/w/api.php";

/// TheAudioDB artist fields holding image URLs, in display order
pub const AUDIODB_IMAGE_FIELDS: &[&str] = &[
    "strArtistThumb",
    "strArtistFanart",
    "strArtistFanart2",
    "strArtistFanart3",
    "strArtistWideThumb",
    "strArtistBanner",
];

#[derive(Debug, Deserialize)]
struct AudioDbSearch {
    artists: Option<Vec<HashMap<String, Value>>>,
}

#[derive(Debug, Deserialize)]
struct WikiResponse {
    query: Option<WikiQuery>,
}

#[derive(Debug, Deserialize)]
struct WikiQuery {
    #[serde(default)]
    pages: HashMap<String, WikiPage>,
}

#[derive(Debug, Deserialize)]
struct WikiPage {
    thumbnail: Option<WikiThumbnail>,
}

#[derive(Debug, Deserialize)]
struct WikiThumbnail {
    source: String,
}

/// Image URLs from the first artist of a TheAudioDB search body
pub fn audiodb_images(body: &str) -> Vec<String> {
    let Ok(search) = serde_json::from_str::<AudioDbSearch>(body) else {
        return Vec::new();
    };
    let Some(artist) = search.artists.and_then(|a| a.into_iter().next()) else {
        return Vec::new();
    };
    AUDIODB_IMAGE_FIELDS
        .iter()
        .filter_map(|field| artist.get(*field).and_then(Value::as_str))
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

/// Page thumbnails from a Wikipedia `pageimages` query body
pub fn wikipedia_images(body: &str) -> Vec<String> {
    serde_json::from_str::<WikiResponse>(body)
        .ok()
        .and_then(|r| r.query)
        .map(|q| {
            q.pages
                .into_values()
                .filter_map(|p| p.thumbnail.map(|t| t.source))
                .collect()
        })
        .unwrap_or_default()
}

pub struct ArtistImageClient {
    http_client: reqwest::Client,
    audiodb_base_url: String,
    wikipedia_url: String,
    cache: Mutex<HashMap<String, Vec<String>>>,
}

impl ArtistImageClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: http_client(timeout)?,
            audiodb_base_url: AUDIODB_BASE_URL.to_string(),
            wikipedia_url: WIKIPEDIA_API_URL.to_string(),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_base_urls(mut self, audiodb: impl Into<String>, wikipedia: impl Into<String>) -> Self {
        self.audiodb_base_url = audiodb.into();
        self.wikipedia_url = wikipedia.into();
        self
    }

    /// Images for `artist`; provider failures degrade to an empty list
    pub async fn fetch(&self, artist: &str) -> Vec<String> {
        if artist.is_empty() {
            return Vec::new();
        }
        if let Some(cached) = self.cache.lock().await.get(artist) {
            return cached.clone();
        }

        let mut images = match self.fetch_audiodb(artist).await {
            Ok(images) => images,
            Err(e) => {
                warn!(artist = %artist, "TheAudioDB error: {}", e);
                Vec::new()
            }
        };
        if images.is_empty() {
            images = match self.fetch_wikipedia(artist).await {
                Ok(images) => images,
                Err(e) => {
                    warn!(artist = %artist, "Wikipedia error: {}", e);
                    Vec::new()
                }
            };
        }

        debug!(artist = %artist, count = images.len(), "Artist images resolved");
        self.cache
            .lock()
            .await
            .insert(artist.to_string(), images.clone());
        images
    }

    async fn fetch_audiodb(&self, artist: &str) -> Result<Vec<String>> {
        let body = self
            .http_client
            .get(format!("{}/search.php", self.audiodb_base_url))
            .query(&[("s", artist)])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(audiodb_images(&body))
    }

    async fn fetch_wikipedia(&self, artist: &str) -> Result<Vec<String>> {
        let body = self
            .http_client
            .get(&self.wikipedia_url)
            .query(&[
                ("action", "query"),
                ("format", "json"),
                ("titles", artist),
                ("prop", "pageimages"),
                ("pithumbsize", "800"),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(wikipedia_images(&body))
    }
}
