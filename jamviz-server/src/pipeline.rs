//! Analysis task: capture blocks in, spectrum frames out
//!
//! Each block feeds the fingerprint buffer (when identification is enabled) and
//! becomes one frame carrying the snapshot current at build time.

use crate::audio::{AudioBlock, SharedFingerprintBuffer, SpectralFrameBuilder, SpectrumFrame};
use crate::coordinator::SnapshotReceiver;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Run until the capture side closes or the frame consumer goes away
///
/// Frames are offered with `try_send`: when the consumer is behind, the frame
/// is dropped rather than delaying the next block.
pub async fn run_analysis(
    mut blocks: mpsc::Receiver<AudioBlock>,
    mut builder: SpectralFrameBuilder,
    fingerprint: Option<SharedFingerprintBuffer>,
    media: SnapshotReceiver,
    frames: mpsc::Sender<SpectrumFrame>,
) {
    info!("Analysis task started");
    let mut dropped: u64 = 0;

    while let Some(block) = blocks.recv().await {
        if let Some(buffer) = &fingerprint {
            match buffer.lock() {
                Ok(mut buffer) => buffer.feed(&block),
                Err(_) => warn!("Fingerprint buffer lock poisoned, block not buffered"),
            }
        }

        let snapshot = media.borrow().clone();
        let frame = builder.build(&block, snapshot);

        match frames.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                if dropped % 100 == 1 {
                    debug!(dropped, "Frame consumer behind, dropping frames");
                }
            }
            Err(TrySendError::Closed(_)) => {
                info!("Frame consumer gone, stopping analysis");
                return;
            }
        }
    }

    // Capture ended; the hub keeps broadcasting the last frame
    warn!("Audio blocks ended, analysis task stopping");
}
