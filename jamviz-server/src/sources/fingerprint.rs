//! Acoustic fingerprint source
//!
//! Throttled by the [`FingerprintBuffer`] gate. The buffer lock is held only to
//! check the gate and copy the snapshot; identification runs without it.

use super::PollTrackSource;
use crate::audio::SharedFingerprintBuffer;
use crate::error::{with_timeout, Error, Result};
use async_trait::async_trait;
use jamviz_common::{SourceKind, TrackCandidate};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Identifies a track from raw mono `i16` audio
#[async_trait]
pub trait AcousticIdentifier: Send + Sync {
    async fn identify(&self, samples: Vec<i16>, sample_rate: u32) -> Result<Option<TrackCandidate>>;
}

pub struct FingerprintSource {
    buffer: SharedFingerprintBuffer,
    identifier: Arc<dyn AcousticIdentifier>,
    timeout: Duration,
}

impl FingerprintSource {
    pub fn new(
        buffer: SharedFingerprintBuffer,
        identifier: Arc<dyn AcousticIdentifier>,
        timeout: Duration,
    ) -> Self {
        Self {
            buffer,
            identifier,
            timeout,
        }
    }

    /// Gate check plus snapshot, under one short lock
    fn take_snapshot(&self) -> Result<Option<(Vec<i16>, u32)>> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| Error::Internal("fingerprint buffer lock poisoned".to_string()))?;
        if !buffer.can_query() {
            return Ok(None);
        }
        let sample_rate = buffer.sample_rate();
        Ok(buffer.begin_attempt().map(|snapshot| (snapshot, sample_rate)))
    }

    fn record(&self, result: Option<TrackCandidate>) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.record_result(result);
        }
    }
}

#[async_trait]
impl PollTrackSource for FingerprintSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Fingerprint
    }

    fn on_demand(&self) -> bool {
        true
    }

    async fn poll(&self) -> Result<Option<TrackCandidate>> {
        let Some((snapshot, sample_rate)) = self.take_snapshot()? else {
            return Ok(None);
        };

        let seconds = snapshot.len() as f64 / sample_rate.max(1) as f64;
        debug!(seconds, "Attempting acoustic identification");

        let identified = with_timeout(
            "acoustic identification",
            self.timeout,
            self.identifier.identify(snapshot, sample_rate),
        )
        .await;

        match identified {
            Ok(result) => {
                if let Some(candidate) = &result {
                    info!(artist = %candidate.artist, title = %candidate.title, "Fingerprint match");
                }
                self.record(result.clone());
                Ok(result.map(|c| TrackCandidate {
                    source: SourceKind::Fingerprint,
                    ..c
                }))
            }
            Err(e) => {
                self.record(None);
                Err(e)
            }
        }
    }
}
