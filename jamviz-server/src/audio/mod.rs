//! Audio capture and analysis
//!
//! - [`capture`]: block sources (command pipe, optional input device)
//! - [`spectrum`]: block → normalized spectrum frame
//! - [`fingerprint_buffer`]: rolling audio for acoustic identification

pub mod capture;
pub mod fingerprint_buffer;
pub mod spectrum;

pub use capture::{run_capture, AudioBlock, CaptureSource, PipeCapture};
pub use fingerprint_buffer::{FingerprintBuffer, SharedFingerprintBuffer};
pub use spectrum::{SpectralFrameBuilder, SpectrumFrame};
