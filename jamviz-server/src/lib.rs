//! # JamViz Server Library (jamviz-server)
//!
//! Real-time audio visualizer backend with now-playing detection.
//!
//! **Purpose:** Capture system audio, turn it into spectrum frames, work out
//! what is playing from several detection sources, enrich the track with artist
//! data and stream everything to browser clients over WebSocket.
//!
//! **Architecture:** single-threaded tokio runtime; one task per perpetual loop
//! (capture, analysis, broadcast, reconciliation, HTTP), spawned tasks for
//! enrichment and history writes.

pub mod api;
pub mod audio;
pub mod broadcast;
pub mod coordinator;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod pipeline;
pub mod process;
pub mod reconcile;
pub mod services;
pub mod sources;

pub use error::{Error, Result};
