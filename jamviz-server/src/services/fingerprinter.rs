//! Acoustic identification via Chromaprint's `fpcalc` and AcoustID
//!
//! The buffered audio is written to a temporary 16-bit mono WAV on a blocking
//! worker, fingerprinted by the `fpcalc` tool, then looked up on AcoustID.

use super::acoustid_client::AcoustIdClient;
use crate::error::{Error, Result};
use crate::process::run_command;
use crate::sources::AcousticIdentifier;
use async_trait::async_trait;
use jamviz_common::{SourceKind, TrackCandidate};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

/// `fpcalc -json` output
#[derive(Debug, Clone, Deserialize)]
pub struct FpcalcOutput {
    pub duration: f64,
    pub fingerprint: String,
}

/// Write mono `i16` samples as a WAV temp file (blocking)
pub fn write_wav(samples: &[i16], sample_rate: u32) -> Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("jamviz-fp-")
        .suffix(".wav")
        .tempfile()?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let map_err = |e: hound::Error| Error::Fingerprint(format!("WAV write failed: {}", e));

    let mut writer = hound::WavWriter::create(file.path(), spec).map_err(map_err)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(map_err)?;
    }
    writer.finalize().map_err(map_err)?;
    Ok(file)
}

pub struct FpcalcIdentifier {
    fpcalc_path: String,
    client: AcoustIdClient,
    min_score: f64,
    timeout: Duration,
}

impl FpcalcIdentifier {
    pub fn new(fpcalc_path: String, client: AcoustIdClient, min_score: f64, timeout: Duration) -> Self {
        Self {
            fpcalc_path,
            client,
            min_score,
            timeout,
        }
    }

    async fn fingerprint(&self, wav: &Path) -> Result<FpcalcOutput> {
        let args = vec!["-json".to_string(), wav.display().to_string()];
        let stdout = run_command(&self.fpcalc_path, &args, self.timeout)
            .await?
            .ok_or_else(|| Error::Fingerprint("fpcalc could not fingerprint the audio".to_string()))?;
        Ok(serde_json::from_str(&stdout)?)
    }
}

#[async_trait]
impl AcousticIdentifier for FpcalcIdentifier {
    async fn identify(&self, samples: Vec<i16>, sample_rate: u32) -> Result<Option<TrackCandidate>> {
        let wav = tokio::task::spawn_blocking(move || write_wav(&samples, sample_rate))
            .await
            .map_err(|e| Error::Internal(format!("WAV writer task failed: {}", e)))??;

        let output = self.fingerprint(wav.path()).await?;
        drop(wav);
        debug!(duration = output.duration, "Fingerprint computed");

        let response = self
            .client
            .lookup(&output.fingerprint, output.duration.round() as u64)
            .await?;

        Ok(response.best_match(self.min_score).map(|m| {
            TrackCandidate::new(m.artist, m.title, SourceKind::Fingerprint)
                .with_recording_id(Some(m.recording_id))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_wav_round_trips_header() {
        let samples: Vec<i16> = (0..4410).map(|i| (i % 200) as i16 - 100).collect();
        let file = write_wav(&samples, 44100).unwrap();

        let reader = hound::WavReader::open(file.path()).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len() as usize, samples.len());
    }

    #[test]
    fn test_temp_file_removed_on_drop() {
        let file = write_wav(&[0; 10], 8000).unwrap();
        let path = file.path().to_path_buf();
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_parse_fpcalc_output() {
        let output: FpcalcOutput =
            serde_json::from_str(r#"{"duration": 19.98, "fingerprint": "AQADtNQYhYkYRcg"}"#).unwrap();
        assert_eq!(output.fingerprint, "AQADtNQYhYkYRcg");
        assert_eq!(output.duration.round() as u64, 20);
    }

    #[tokio::test]
    async fn test_missing_fpcalc_is_error() {
        let client = AcoustIdClient::new("key".to_string(), Duration::from_secs(1)).unwrap();
        let identifier = FpcalcIdentifier::new(
            "/nonexistent/fpcalc".to_string(),
            client,
            0.5,
            Duration::from_secs(1),
        );
        let result = identifier.identify(vec![0; 44100], 44100).await;
        assert!(result.is_err());
    }
}
