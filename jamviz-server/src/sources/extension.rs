//! Browser extension ingestion
//!
//! `POST /track` stores the latest pushed track here; the next poll takes it.
//! A push that is never polled is simply replaced by the following one.

use super::PollTrackSource;
use crate::error::Result;
use async_trait::async_trait;
use jamviz_common::{SourceKind, TrackCandidate};
use std::sync::Mutex;
use tracing::info;

/// Single-slot inbox for extension pushes
#[derive(Debug, Default)]
pub struct ExtensionInbox {
    latest: Mutex<Option<TrackCandidate>>,
}

impl ExtensionInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a push; returns false (and stores nothing) when artist and title are both empty
    pub fn push(&self, artist: &str, title: &str, album: &str, artwork: Option<String>) -> bool {
        let candidate = TrackCandidate::new(artist, title, SourceKind::Extension)
            .with_album(album)
            .with_thumbnail(artwork);
        if candidate.is_empty() {
            return false;
        }

        info!(artist = %candidate.artist, title = %candidate.title, "Extension push received");
        if let Ok(mut slot) = self.latest.lock() {
            *slot = Some(candidate);
        }
        true
    }

    pub fn take(&self) -> Option<TrackCandidate> {
        self.latest.lock().ok().and_then(|mut slot| slot.take())
    }
}

#[async_trait]
impl PollTrackSource for ExtensionInbox {
    fn kind(&self) -> SourceKind {
        SourceKind::Extension
    }

    async fn poll(&self) -> Result<Option<TrackCandidate>> {
        Ok(self.take())
    }
}
