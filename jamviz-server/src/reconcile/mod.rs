//! Track reconciliation
//!
//! Fuses the candidates produced by all sources in one polling cycle into a
//! single accept/ignore decision. The reconciler is a plain state machine; the
//! coordinator task owns it and performs the side effects of an accept.

pub mod title;

use jamviz_common::{SourceKind, TrackCandidate, TrackKey};
use tracing::debug;

pub use title::{parse_tab_title, ParsedTitle};

/// A candidate that became the canonical track
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub candidate: TrackCandidate,
    /// Change counter after this accept; enrichment results carry it back
    pub generation: u64,
}

/// Last-accepted-key state machine with per-cycle source priority
#[derive(Debug)]
pub struct TrackReconciler {
    priority: Vec<SourceKind>,
    last_key: Option<TrackKey>,
    last_source: Option<SourceKind>,
    generation: u64,
}

impl TrackReconciler {
    /// `priority` lists sources highest first; unlisted sources rank last
    pub fn new(priority: Vec<SourceKind>) -> Self {
        Self {
            priority,
            last_key: None,
            last_source: None,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_key(&self) -> Option<&TrackKey> {
        self.last_key.as_ref()
    }

    pub fn last_source(&self) -> Option<SourceKind> {
        self.last_source
    }

    fn rank(&self, kind: SourceKind) -> usize {
        self.priority
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.priority.len())
    }

    /// Whether the fingerprint source may run this cycle
    ///
    /// Closed while the canonical track came from the media session, so an
    /// acoustic guess never overrides authoritative player metadata.
    pub fn fingerprint_allowed(&self) -> bool {
        self.last_source != Some(SourceKind::MediaSession)
    }

    /// Highest-priority non-empty candidate of one cycle
    ///
    /// Fingerprint candidates are dropped while the gate is closed. Ties within
    /// one source keep the first candidate.
    pub fn select(&self, candidates: Vec<TrackCandidate>) -> Option<TrackCandidate> {
        let fingerprint_allowed = self.fingerprint_allowed();
        candidates
            .into_iter()
            .filter(|c| !c.is_empty())
            .filter(|c| fingerprint_allowed || c.source != SourceKind::Fingerprint)
            .enumerate()
            .min_by_key(|(index, c)| (self.rank(c.source), *index))
            .map(|(_, c)| c)
    }

    /// Accept `candidate` unless it repeats the current key
    pub fn offer(&mut self, candidate: TrackCandidate) -> Option<Accepted> {
        if candidate.is_empty() {
            return None;
        }
        let key = candidate.key();
        if self.last_key.as_ref() == Some(&key) {
            debug!(source = %candidate.source, key = %key, "Same track, ignoring");
            return None;
        }

        self.last_key = Some(key);
        self.last_source = Some(candidate.source);
        self.generation += 1;

        Some(Accepted {
            candidate,
            generation: self.generation,
        })
    }

    /// Select the cycle winner and offer it
    pub fn reconcile(&mut self, candidates: Vec<TrackCandidate>) -> Option<Accepted> {
        let winner = self.select(candidates)?;
        self.offer(winner)
    }
}
