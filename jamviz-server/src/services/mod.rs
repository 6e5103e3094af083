//! External catalog and tool integrations
//!
//! Each client owns its `reqwest::Client` and, where the remote service asks for
//! it, a [`RateLimiter`].

pub mod acoustid_client;
pub mod artist_images;
pub mod catalog_enricher;
pub mod color_extractor;
pub mod fingerprinter;
pub mod musicbrainz_client;
pub mod video_lookup;

pub use catalog_enricher::CatalogEnricher;
pub use fingerprinter::FpcalcIdentifier;
pub use video_lookup::YtDlpLookup;

use crate::error::Result;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// User-Agent sent to every catalog service
pub const USER_AGENT: &str = concat!("jamviz/", env!("CARGO_PKG_VERSION"), " (now-playing visualizer)");

/// HTTP client with the shared User-Agent and a request timeout
pub fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Minimum spacing between requests to one service
pub struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if necessary to comply with the rate limit
    pub async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}
