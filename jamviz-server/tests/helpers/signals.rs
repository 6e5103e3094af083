//! Deterministic test signals
//!
//! Mono `f32` blocks with known characteristics:
//! - silence (all zeros)
//! - sine waves at a given frequency and amplitude

use std::f32::consts::PI;

/// Standard test sample rate (44.1 kHz)
pub const TEST_SAMPLE_RATE: u32 = 44100;

/// One block of silence
pub fn silence(samples: usize) -> Vec<f32> {
    vec![0.0; samples]
}

/// One block of a sine wave
pub fn sine(samples: usize, frequency: f32, amplitude: f32) -> Vec<f32> {
    (0..samples)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / TEST_SAMPLE_RATE as f32).sin())
        .collect()
}
