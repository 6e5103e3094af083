//! Now-playing coordinator
//!
//! One task owns the canonical [`MediaSnapshot`]. It runs the reconciliation
//! cycle, performs the accept side effects and merges enrichment results.
//! Everyone else reads immutable `Arc` snapshots from the watch channel.
//!
//! Per cycle:
//! - cheap sources are polled concurrently, each under the poll timeout
//! - on-demand sources (acoustic identification) run in the background only
//!   when no cheap source produced anything; their answer joins the next cycle
//! - the reconciler picks the winner; an accept resets the fingerprint buffer,
//!   records history, publishes the stage-one snapshot and starts enrichment

use crate::audio::SharedFingerprintBuffer;
use crate::db::HistorySink;
use crate::enrichment::{EnrichmentCoordinator, StageUpdate};
use crate::error::{with_timeout, Result};
use crate::reconcile::{Accepted, TrackReconciler};
use crate::sources::PollTrackSource;
use futures::future::join_all;
use jamviz_common::models::HistoryEntry;
use jamviz_common::{MediaSnapshot, SourceKind, TrackCandidate};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Receiver side of the canonical snapshot
pub type SnapshotReceiver = watch::Receiver<Arc<MediaSnapshot>>;

/// Cycle timing
#[derive(Debug, Clone, Copy)]
pub struct CycleSettings {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

/// Outcome of one background on-demand poll
#[derive(Debug)]
struct Identified {
    /// Change counter when the poll was started
    generation: u64,
    result: Option<TrackCandidate>,
}

pub struct TrackCoordinator {
    reconciler: TrackReconciler,
    sources: Vec<Arc<dyn PollTrackSource>>,
    fingerprint_buffer: Option<SharedFingerprintBuffer>,
    history: Arc<dyn HistorySink>,
    enrichment: EnrichmentCoordinator,
    stage_updates: mpsc::Receiver<StageUpdate>,
    identified_tx: mpsc::Sender<Identified>,
    identified_rx: mpsc::Receiver<Identified>,
    identifying: bool,
    pending_identified: Option<TrackCandidate>,
    failures: HashMap<SourceKind, u32>,
    snapshot: MediaSnapshot,
    publisher: watch::Sender<Arc<MediaSnapshot>>,
    settings: CycleSettings,
}

impl TrackCoordinator {
    pub fn new(
        reconciler: TrackReconciler,
        enrichment: EnrichmentCoordinator,
        stage_updates: mpsc::Receiver<StageUpdate>,
        history: Arc<dyn HistorySink>,
        settings: CycleSettings,
    ) -> Self {
        let snapshot = MediaSnapshot::default();
        let (publisher, _) = watch::channel(Arc::new(snapshot.clone()));
        let (identified_tx, identified_rx) = mpsc::channel(4);
        Self {
            reconciler,
            sources: Vec::new(),
            fingerprint_buffer: None,
            history,
            enrichment,
            stage_updates,
            identified_tx,
            identified_rx,
            identifying: false,
            pending_identified: None,
            failures: HashMap::new(),
            snapshot,
            publisher,
            settings,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn PollTrackSource>) -> Self {
        info!(source = %source.kind(), on_demand = source.on_demand(), "Detection source enabled");
        self.sources.push(source);
        self
    }

    /// Buffer reset on every track change
    pub fn with_fingerprint_buffer(mut self, buffer: SharedFingerprintBuffer) -> Self {
        self.fingerprint_buffer = Some(buffer);
        self
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> &MediaSnapshot {
        &self.snapshot
    }

    /// Run forever
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_ms = self.settings.poll_interval.as_millis() as u64,
            sources = self.sources.len(),
            "Track coordinator started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_cycle().await,
                Some(update) = self.stage_updates.recv() => self.apply_stage(update),
                Some(identified) = self.identified_rx.recv() => self.on_identified(identified),
            }
        }
    }

    /// One reconciliation cycle
    pub async fn poll_cycle(&mut self) {
        let mut candidates = self.poll_cheap_sources().await;
        if let Some(identified) = self.pending_identified.take() {
            candidates.push(identified);
        }

        if candidates.is_empty() {
            self.start_on_demand();
            return;
        }

        if let Some(accepted) = self.reconciler.reconcile(candidates) {
            self.accept(accepted);
        }
    }

    async fn poll_cheap_sources(&mut self) -> Vec<TrackCandidate> {
        let timeout = self.settings.poll_timeout;
        let polls = self
            .sources
            .iter()
            .filter(|source| !source.on_demand())
            .map(|source| async move {
                let kind = source.kind();
                (kind, with_timeout(kind.as_str(), timeout, source.poll()).await)
            });
        let results = join_all(polls).await;

        let mut candidates = Vec::new();
        for (kind, result) in results {
            match result {
                Ok(candidate) => {
                    if let Some(previous) = self.failures.remove(&kind) {
                        info!(source = %kind, failures = previous, "Source recovered");
                    }
                    if let Some(candidate) = candidate {
                        debug!(source = %kind, artist = %candidate.artist, title = %candidate.title, "Candidate");
                        candidates.push(candidate);
                    }
                }
                Err(e) => self.note_failure(kind, &e),
            }
        }
        candidates
    }

    /// First failure in a row is a warning, repeats are debug noise
    fn note_failure(&mut self, kind: SourceKind, error: &crate::error::Error) {
        let count = self.failures.entry(kind).or_insert(0);
        *count += 1;
        if *count == 1 {
            warn!(source = %kind, "Source poll failed: {}", error);
        } else {
            debug!(source = %kind, failures = *count, "Source poll failed: {}", error);
        }
    }

    /// Start background polls of on-demand sources, unless one is running
    ///
    /// The poll runs in its own task so a panic still reports back an empty
    /// result and the next silent cycle can try again.
    fn start_on_demand(&mut self) {
        if self.identifying || !self.reconciler.fingerprint_allowed() {
            return;
        }
        let Some(source) = self.sources.iter().find(|s| s.on_demand()).cloned() else {
            return;
        };

        self.identifying = true;
        let generation = self.reconciler.generation();
        let tx = self.identified_tx.clone();
        tokio::spawn(async move {
            let kind = source.kind();
            let poll = tokio::spawn(async move { source.poll().await });
            let result = match poll.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(source = %kind, "On-demand poll failed: {}", e);
                    None
                }
                Err(e) => {
                    warn!(source = %kind, "On-demand poll task aborted: {}", e);
                    None
                }
            };
            let _ = tx.send(Identified { generation, result }).await;
        });
    }

    fn on_identified(&mut self, identified: Identified) {
        self.identifying = false;
        if identified.generation != self.reconciler.generation() {
            debug!("Discarding identification started before the last track change");
            return;
        }
        self.pending_identified = identified.result;
    }

    fn apply_stage(&mut self, update: StageUpdate) {
        let generation = self.reconciler.generation();
        if self.enrichment.merge(&mut self.snapshot, generation, update) {
            self.publish();
        }
    }

    fn accept(&mut self, accepted: Accepted) {
        let Accepted { candidate, generation } = accepted;
        info!(
            artist = %candidate.artist,
            title = %candidate.title,
            source = %candidate.source,
            generation,
            "Now playing"
        );

        self.pending_identified = None;
        if let Some(buffer) = &self.fingerprint_buffer {
            match buffer.lock() {
                Ok(mut buffer) => buffer.reset(),
                Err(_) => warn!("Fingerprint buffer lock poisoned, not reset"),
            }
        }

        let history = Arc::clone(&self.history);
        let entry = HistoryEntry {
            artist: candidate.artist.clone(),
            title: candidate.title.clone(),
            album: candidate.album.clone(),
            source: candidate.source,
            timestamp: candidate.timestamp,
        };
        tokio::spawn(async move {
            if let Err(e) = history.record(entry).await {
                warn!("History write failed: {}", e);
            }
        });

        self.snapshot = MediaSnapshot::for_track(
            &candidate,
            self.snapshot.profile_version + 1,
            self.snapshot.history_version + 1,
        );
        self.publish();

        self.enrichment.start(generation, &candidate);
    }

    fn publish(&self) {
        self.publisher.send_replace(Arc::new(self.snapshot.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::EnrichmentTimeouts;
    use crate::error::Error;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedSource {
        kind: SourceKind,
        on_demand: bool,
        answer: Mutex<Option<TrackCandidate>>,
        fail: bool,
        panic_next: AtomicBool,
        polls: AtomicUsize,
    }

    impl FixedSource {
        fn new(kind: SourceKind, answer: Option<(&str, &str)>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                on_demand: kind == SourceKind::Fingerprint,
                answer: Mutex::new(answer.map(|(a, t)| TrackCandidate::new(a, t, kind))),
                fail: false,
                panic_next: AtomicBool::new(false),
                polls: AtomicUsize::new(0),
            })
        }

        fn failing(kind: SourceKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                on_demand: false,
                answer: Mutex::new(None),
                fail: true,
                panic_next: AtomicBool::new(false),
                polls: AtomicUsize::new(0),
            })
        }

        fn set(&self, answer: Option<(&str, &str)>) {
            *self.answer.lock().unwrap() = answer.map(|(a, t)| TrackCandidate::new(a, t, self.kind));
        }

        fn crash_next_poll(&self) {
            self.panic_next.store(true, Ordering::SeqCst);
        }

        fn polls(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PollTrackSource for FixedSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn on_demand(&self) -> bool {
            self.on_demand
        }

        async fn poll(&self) -> Result<Option<TrackCandidate>> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            if self.panic_next.swap(false, Ordering::SeqCst) {
                panic!("fpcalc output unreadable");
            }
            if self.fail {
                return Err(Error::Process("player not running".to_string()));
            }
            Ok(self.answer.lock().unwrap().clone())
        }
    }

    #[derive(Default)]
    struct RecordingHistory {
        entries: Mutex<Vec<HistoryEntry>>,
    }

    #[async_trait]
    impl HistorySink for RecordingHistory {
        async fn record(&self, entry: HistoryEntry) -> Result<()> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }
    }

    fn coordinator(history: Arc<RecordingHistory>) -> TrackCoordinator {
        let (enrichment, updates) = EnrichmentCoordinator::new(
            None,
            None,
            EnrichmentTimeouts {
                stage: Duration::from_secs(1),
                video: Duration::from_secs(1),
            },
            String::new(),
        );
        TrackCoordinator::new(
            TrackReconciler::new(SourceKind::DEFAULT_PRIORITY.to_vec()),
            enrichment,
            updates,
            history,
            CycleSettings {
                poll_interval: Duration::from_millis(20),
                poll_timeout: Duration::from_millis(200),
            },
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_accept_publishes_stage_one_snapshot() {
        let history = Arc::new(RecordingHistory::default());
        let media = FixedSource::new(SourceKind::MediaSession, Some(("Queen", "Bohemian Rhapsody")));
        let mut coordinator = coordinator(history.clone()).with_source(media.clone());
        let mut rx = coordinator.subscribe();

        coordinator.poll_cycle().await;
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert_eq!(snapshot.artist, "Queen");
        assert_eq!(snapshot.detection_source, Some(SourceKind::MediaSession));
        assert_eq!(snapshot.profile_version, 1);
        assert_eq!(snapshot.history_version, 1);

        // Same track next cycle: nothing new
        coordinator.poll_cycle().await;
        assert!(!rx.has_changed().unwrap());

        settle().await;
        assert_eq!(history.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_track_change_bumps_versions() {
        let history = Arc::new(RecordingHistory::default());
        let tab = FixedSource::new(SourceKind::WindowTitle, Some(("A", "One")));
        let mut coordinator = coordinator(history.clone()).with_source(tab.clone());

        coordinator.poll_cycle().await;
        tab.set(Some(("A", "Two")));
        coordinator.poll_cycle().await;

        assert_eq!(coordinator.snapshot().title, "Two");
        assert_eq!(coordinator.snapshot().profile_version, 2);
        assert_eq!(coordinator.snapshot().history_version, 2);
        settle().await;
        assert_eq!(history.entries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_others() {
        let history = Arc::new(RecordingHistory::default());
        let broken = FixedSource::failing(SourceKind::MediaSession);
        let tab = FixedSource::new(SourceKind::WindowTitle, Some(("Daft Punk", "One More Time")));
        let mut coordinator = coordinator(history)
            .with_source(broken.clone())
            .with_source(tab);

        coordinator.poll_cycle().await;
        coordinator.poll_cycle().await;
        assert_eq!(broken.polls(), 2);
        assert_eq!(coordinator.snapshot().artist, "Daft Punk");
        assert_eq!(coordinator.failures.get(&SourceKind::MediaSession), Some(&2));
    }

    #[tokio::test]
    async fn test_on_demand_only_when_cheap_sources_silent() {
        let history = Arc::new(RecordingHistory::default());
        let tab = FixedSource::new(SourceKind::WindowTitle, Some(("A", "B")));
        let fingerprint = FixedSource::new(SourceKind::Fingerprint, Some(("X", "Y")));
        let mut coordinator = coordinator(history)
            .with_source(tab.clone())
            .with_source(fingerprint.clone());

        coordinator.poll_cycle().await;
        settle().await;
        assert_eq!(fingerprint.polls(), 0);

        tab.set(None);
        coordinator.poll_cycle().await;
        settle().await;
        assert_eq!(fingerprint.polls(), 1);
    }

    #[tokio::test]
    async fn test_identification_accepted_through_run_loop() {
        let history = Arc::new(RecordingHistory::default());
        let fingerprint = FixedSource::new(SourceKind::Fingerprint, Some(("Portishead", "Roads")));
        let coordinator = coordinator(history).with_source(fingerprint);
        let mut rx = coordinator.subscribe();
        let task = tokio::spawn(coordinator.run());

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("snapshot published")
            .unwrap();
        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.title, "Roads");
        assert_eq!(snapshot.detection_source, Some(SourceKind::Fingerprint));
        task.abort();
    }

    #[tokio::test]
    async fn test_identification_retried_after_panicking_poll() {
        let history = Arc::new(RecordingHistory::default());
        let fingerprint = FixedSource::new(SourceKind::Fingerprint, Some(("Massive Attack", "Teardrop")));
        fingerprint.crash_next_poll();
        let coordinator = coordinator(history).with_source(fingerprint.clone());
        let mut rx = coordinator.subscribe();
        let task = tokio::spawn(coordinator.run());

        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("identification retried after the crash")
            .unwrap();
        assert_eq!(rx.borrow().title, "Teardrop");
        assert!(fingerprint.polls() >= 2);
        task.abort();
    }

    #[tokio::test]
    async fn test_media_session_wins_over_identification() {
        let history = Arc::new(RecordingHistory::default());
        let media = FixedSource::new(SourceKind::MediaSession, Some(("Queen", "Bohemian Rhapsody")));
        let mut coordinator = coordinator(history).with_source(media.clone());

        coordinator.poll_cycle().await;
        coordinator.pending_identified = Some(TrackCandidate::new("Other", "Song", SourceKind::Fingerprint));
        coordinator.poll_cycle().await;

        assert_eq!(coordinator.snapshot().artist, "Queen");
        assert_eq!(coordinator.snapshot().profile_version, 1);
    }

    #[tokio::test]
    async fn test_stale_identification_dropped() {
        let history = Arc::new(RecordingHistory::default());
        let mut coordinator = coordinator(history);
        coordinator.identifying = true;
        coordinator.on_identified(Identified {
            generation: 7,
            result: Some(TrackCandidate::new("X", "Y", SourceKind::Fingerprint)),
        });
        assert!(!coordinator.identifying);
        assert!(coordinator.pending_identified.is_none());
    }
}
