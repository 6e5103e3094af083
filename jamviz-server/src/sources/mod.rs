//! Track detection sources
//!
//! Every origin of "what is playing" implements [`PollTrackSource`]. The
//! coordinator polls all cheap sources each cycle and only falls back to the
//! on-demand ones (acoustic identification) when none of them had an answer.

pub mod extension;
pub mod fingerprint;
pub mod media_session;
pub mod window_title;

use crate::error::Result;
use async_trait::async_trait;
use jamviz_common::{SourceKind, TrackCandidate};

pub use extension::ExtensionInbox;
pub use fingerprint::{AcousticIdentifier, FingerprintSource};
pub use media_session::MediaSessionSource;
pub use window_title::WindowTitleSource;

/// A detection origin polled once per reconciliation cycle
#[async_trait]
pub trait PollTrackSource: Send + Sync {
    /// Which source this is (drives priority)
    fn kind(&self) -> SourceKind;

    /// Current detection, if any
    ///
    /// Errors are transient: the caller logs them and treats the cycle as
    /// "no candidate" for this source.
    async fn poll(&self) -> Result<Option<TrackCandidate>>;

    /// Expensive sources are polled only when no other source produced a candidate
    fn on_demand(&self) -> bool {
        false
    }
}
