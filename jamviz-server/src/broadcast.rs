//! Frame broadcast hub
//!
//! The hub task owns the latest frame and the subscriber set. On every tick
//! it serializes the latest frame once and offers it to each subscriber through
//! a one-slot channel: a full slot means that subscriber misses this frame, a
//! closed slot removes the subscriber. Nothing queues up behind a slow client.

use crate::audio::SpectrumFrame;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Serialized frame shared by all subscribers of one tick
pub type FrameMessage = Arc<str>;

/// Per-tick delivery counts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub delivered: usize,
    pub missed: usize,
    pub removed: usize,
}

/// Latest frame plus live subscribers
#[derive(Default)]
pub struct BroadcastHub {
    subscribers: HashMap<Uuid, mpsc::Sender<FrameMessage>>,
    latest: Option<SpectrumFrame>,
    latest_json: Option<FrameMessage>,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self) -> (Uuid, mpsc::Receiver<FrameMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(1);
        self.subscribers.insert(id, tx);
        info!(subscriber = %id, total = self.subscribers.len(), "Subscriber connected");
        (id, rx)
    }

    pub fn disconnect(&mut self, id: Uuid) {
        if self.subscribers.remove(&id).is_some() {
            info!(subscriber = %id, total = self.subscribers.len(), "Subscriber disconnected");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Replace the latest frame
    pub fn publish(&mut self, frame: SpectrumFrame) {
        self.latest = Some(frame);
        self.latest_json = None;
    }

    /// Offer the latest frame to every subscriber
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if self.subscribers.is_empty() {
            return report;
        }
        let Some(message) = self.latest_message() else {
            return report;
        };

        let mut closed = Vec::new();
        for (id, tx) in &self.subscribers {
            match tx.try_send(Arc::clone(&message)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => report.missed += 1,
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }
        for id in closed {
            self.disconnect(id);
            report.removed += 1;
        }
        report
    }

    /// Serialized latest frame, cached until the next publish
    fn latest_message(&mut self) -> Option<FrameMessage> {
        if self.latest_json.is_none() {
            let frame = self.latest.as_ref()?;
            match serde_json::to_string(frame) {
                Ok(json) => self.latest_json = Some(Arc::from(json)),
                Err(e) => {
                    warn!("Frame serialization failed: {}", e);
                    return None;
                }
            }
        }
        self.latest_json.clone()
    }
}

enum HubCommand {
    Connect(oneshot::Sender<(Uuid, mpsc::Receiver<FrameMessage>)>),
    Disconnect(Uuid),
}

/// Cloneable access to a running hub task
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    frames: mpsc::Sender<SpectrumFrame>,
}

impl HubHandle {
    /// Register a subscriber; `None` once the hub has stopped
    pub async fn connect(&self) -> Option<(Uuid, mpsc::Receiver<FrameMessage>)> {
        let (reply, response) = oneshot::channel();
        self.commands.send(HubCommand::Connect(reply)).await.ok()?;
        response.await.ok()
    }

    pub async fn disconnect(&self, id: Uuid) {
        let _ = self.commands.send(HubCommand::Disconnect(id)).await;
    }

    /// Sender for the analysis task
    pub fn frame_sender(&self) -> mpsc::Sender<SpectrumFrame> {
        self.frames.clone()
    }
}

/// Start the hub task pushing at `fps` frames per second
pub fn spawn_hub(fps: u32) -> HubHandle {
    let (commands, command_rx) = mpsc::channel(32);
    // A couple of frames of slack; the hub only keeps the newest
    let (frames, frame_rx) = mpsc::channel(4);
    tokio::spawn(run_hub(BroadcastHub::new(), command_rx, frame_rx, fps));
    HubHandle { commands, frames }
}

async fn run_hub(
    mut hub: BroadcastHub,
    mut commands: mpsc::Receiver<HubCommand>,
    mut frames: mpsc::Receiver<SpectrumFrame>,
    fps: u32,
) {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(fps, "Broadcast hub started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = hub.tick();
                if report.missed > 0 {
                    debug!(missed = report.missed, "Slow subscribers skipped a frame");
                }
            }
            Some(frame) = frames.recv() => hub.publish(frame),
            command = commands.recv() => match command {
                Some(HubCommand::Connect(reply)) => {
                    let _ = reply.send(hub.connect());
                }
                Some(HubCommand::Disconnect(id)) => hub.disconnect(id),
                None => {
                    info!("Broadcast hub stopped");
                    return;
                }
            },
        }
    }
}
