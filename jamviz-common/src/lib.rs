//! # JamViz Common Library
//!
//! Shared code for the JamViz workspace:
//! - Now-playing data model (MediaSnapshot, TrackCandidate, TrackKey)
//! - Artist profile and history records
//! - Bootstrap configuration loading (TOML + environment)
//! - Common error type

pub mod config;
pub mod error;
pub mod models;

pub use error::{Error, Result};
pub use models::{MediaSnapshot, SourceKind, TrackCandidate, TrackKey};
