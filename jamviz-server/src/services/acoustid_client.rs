//! AcoustID API client
//!
//! Looks up a Chromaprint fingerprint and returns the best recording match.

use super::{http_client, RateLimiter};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

const ACOUSTID_BASE_URL: &str = "https://api.acoustid.org/v2/lookup";
/// 3 requests per second
const RATE_LIMIT: Duration = Duration::from_millis(334);

#[derive(Debug, Clone, Deserialize)]
pub struct AcoustIdResponse {
    pub status: String,
    #[serde(default)]
    pub results: Vec<AcoustIdResult>,
    pub error: Option<AcoustIdApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcoustIdApiError {
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcoustIdResult {
    pub id: String,
    pub score: f64,
    pub recordings: Option<Vec<AcoustIdRecording>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcoustIdRecording {
    /// MusicBrainz recording ID
    pub id: String,
    pub title: Option<String>,
    pub artists: Option<Vec<AcoustIdArtist>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AcoustIdArtist {
    pub name: String,
    pub joinphrase: Option<String>,
}

/// Best recording of a lookup
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingMatch {
    pub artist: String,
    pub title: String,
    pub recording_id: String,
    pub score: f64,
}

impl AcoustIdRecording {
    /// Credited artists as one display string
    pub fn artist_credit(&self) -> String {
        let Some(artists) = &self.artists else {
            return String::new();
        };
        let mut credit = String::new();
        for (i, artist) in artists.iter().enumerate() {
            credit.push_str(&artist.name);
            if i + 1 < artists.len() {
                credit.push_str(artist.joinphrase.as_deref().unwrap_or("; "));
            }
        }
        credit
    }
}

impl AcoustIdResponse {
    /// First recording, in result order, of a result scoring at least `min_score`
    pub fn best_match(&self, min_score: f64) -> Option<RecordingMatch> {
        self.results
            .iter()
            .filter(|r| r.score >= min_score)
            .flat_map(|r| {
                r.recordings
                    .iter()
                    .flatten()
                    .map(move |recording| (r.score, recording))
            })
            .map(|(score, recording)| RecordingMatch {
                artist: recording.artist_credit(),
                title: recording.title.clone().unwrap_or_default(),
                recording_id: recording.id.clone(),
                score,
            })
            .find(|m| !m.artist.is_empty() || !m.title.is_empty())
    }
}

pub struct AcoustIdClient {
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
    api_key: String,
    base_url: String,
}

impl AcoustIdClient {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: http_client(timeout)?,
            rate_limiter: RateLimiter::new(RATE_LIMIT),
            api_key,
            base_url: ACOUSTID_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Look up a fingerprint of `duration_seconds` of audio
    pub async fn lookup(&self, fingerprint: &str, duration_seconds: u64) -> Result<AcoustIdResponse> {
        self.rate_limiter.wait().await;

        let duration = duration_seconds.to_string();
        let params = [
            ("client", self.api_key.as_str()),
            ("meta", "recordings"),
            ("duration", duration.as_str()),
            ("fingerprint", fingerprint),
        ];

        debug!(duration_seconds, "Querying AcoustID API");

        let response = self
            .http_client
            .post(&self.base_url)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body: AcoustIdResponse = response.json().await?;

        if !status.is_success() || body.status != "ok" {
            let message = body
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| format!("status {}", status));
            return Err(Error::Fingerprint(format!("AcoustID lookup failed: {}", message)));
        }

        if let Some(top) = body.results.first() {
            info!(acoustid = %top.id, score = top.score, "AcoustID lookup returned results");
        }
        Ok(body)
    }
}
