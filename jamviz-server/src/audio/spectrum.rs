//! Spectrum frame assembly
//!
//! Turns one mono capture block into a normalized, log-binned spectrum plus a
//! downsampled waveform. The only state carried between blocks is the running
//! peak used for automatic gain, and the cached FFT plan.

use jamviz_common::MediaSnapshot;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Serialize, Serializer};
use std::sync::Arc;

/// Weight of the previous running peak when the current frame is quieter
const PEAK_DECAY: f32 = 0.995;

/// Running peak before the first frame
const INITIAL_RUNNING_PEAK: f32 = 1.0;

/// One frame pushed to subscribers
///
/// Immutable once built; the broadcast hub replaces its latest frame wholesale.
#[derive(Debug, Clone, Serialize)]
pub struct SpectrumFrame {
    /// Normalized spectrum buckets in [0, 1]
    #[serde(rename = "fft", serialize_with = "round4_slice")]
    pub bins: Vec<f32>,
    /// Downsampled raw signal
    #[serde(serialize_with = "round4_slice")]
    pub waveform: Vec<f32>,
    /// Largest absolute sample in the block
    #[serde(serialize_with = "round4")]
    pub peak: f32,
    /// Canonical now-playing state at the time the frame was built
    pub media: Arc<MediaSnapshot>,
}

fn round4_value(value: f32) -> f64 {
    (value as f64 * 10_000.0).round() / 10_000.0
}

fn round4<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round4_value(*value))
}

fn round4_slice<S: Serializer>(values: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().map(|v| round4_value(*v)))
}

/// Builds [`SpectrumFrame`]s from capture blocks
pub struct SpectralFrameBuilder {
    fft_bins: usize,
    waveform_points: usize,
    running_peak: f32,
    planner: FftPlanner<f32>,
    fft: Option<Arc<dyn Fft<f32>>>,
    buffer: Vec<Complex<f32>>,
}

impl SpectralFrameBuilder {
    pub fn new(fft_bins: usize, waveform_points: usize) -> Self {
        Self {
            fft_bins,
            waveform_points,
            running_peak: INITIAL_RUNNING_PEAK,
            planner: FftPlanner::new(),
            fft: None,
            buffer: Vec::new(),
        }
    }

    /// Current automatic-gain reference
    pub fn running_peak(&self) -> f32 {
        self.running_peak
    }

    /// Build a frame from one block and the current snapshot
    ///
    /// Never fails: an empty or degenerate block produces all-zero buckets.
    pub fn build(&mut self, block: &[f32], media: Arc<MediaSnapshot>) -> SpectrumFrame {
        let spectrum = self.magnitude_spectrum(block);
        let binned = log_bin(&spectrum, self.fft_bins);
        let bins = self.normalize(binned);

        SpectrumFrame {
            bins,
            waveform: downsample(block, self.waveform_points),
            peak: peak_amplitude(block),
            media,
        }
    }

    /// Attack-fast/decay-slow gain, then scale into [0, 1]
    fn normalize(&mut self, mut binned: Vec<f32>) -> Vec<f32> {
        let current_max = binned.iter().copied().fold(0.0f32, f32::max);

        if current_max > self.running_peak {
            self.running_peak = current_max;
        } else {
            self.running_peak = self.running_peak * PEAK_DECAY + current_max * (1.0 - PEAK_DECAY);
        }

        if self.running_peak > 0.0 && self.running_peak.is_finite() {
            for value in binned.iter_mut() {
                *value = (*value / self.running_peak).clamp(0.0, 1.0);
            }
        } else {
            binned.iter_mut().for_each(|v| *v = 0.0);
        }
        binned
    }

    /// Magnitudes of the non-negative frequency half (`len / 2 + 1` values)
    fn magnitude_spectrum(&mut self, block: &[f32]) -> Vec<f32> {
        if block.is_empty() {
            return Vec::new();
        }

        let len = block.len();
        let fft = match &self.fft {
            Some(fft) if fft.len() == len => Arc::clone(fft),
            _ => {
                let fft = self.planner.plan_fft_forward(len);
                self.fft = Some(Arc::clone(&fft));
                fft
            }
        };

        self.buffer.clear();
        self.buffer.extend(block.iter().map(|&s| {
            let s = if s.is_finite() { s } else { 0.0 };
            Complex::new(s, 0.0)
        }));
        fft.process(&mut self.buffer);

        self.buffer[..len / 2 + 1]
            .iter()
            .map(|c| {
                let magnitude = c.norm();
                if magnitude.is_finite() {
                    magnitude
                } else {
                    0.0
                }
            })
            .collect()
    }
}

/// Log-spaced bucket edges over `n` spectrum bins
///
/// `edges[i] = round(10^(log10(n) * i / num_bins))` for `i in 0..=num_bins`,
/// clipped to `[0, n]` and de-duplicated. Always non-decreasing.
pub fn log_bin_edges(n: usize, num_bins: usize) -> Vec<usize> {
    if n == 0 || num_bins == 0 {
        return Vec::new();
    }

    let log_n = (n as f64).log10();
    let mut edges: Vec<usize> = (0..=num_bins)
        .map(|i| {
            let exponent = log_n * i as f64 / num_bins as f64;
            (10f64.powf(exponent).round() as usize).min(n)
        })
        .collect();
    edges.dedup();
    edges
}

/// Group a linear spectrum into exactly `num_bins` log-spaced buckets
///
/// Each bucket is the mean of `spectrum[edges[i]..edges[i + 1]]`. When
/// de-duplication leaves fewer buckets the result is right-padded with zeros.
pub fn log_bin(spectrum: &[f32], num_bins: usize) -> Vec<f32> {
    let mut binned = vec![0.0f32; num_bins];
    let edges = log_bin_edges(spectrum.len(), num_bins);

    for (slot, window) in binned.iter_mut().zip(edges.windows(2)) {
        let (start, end) = (window[0], window[1]);
        if start < end {
            let bucket = &spectrum[start..end];
            *slot = bucket.iter().sum::<f32>() / bucket.len() as f32;
        }
    }
    binned
}

/// Pick `target` index-evenly-spaced samples
///
/// Returns the input unchanged when it already has `target` samples or fewer.
/// Otherwise index `i` maps to `i * (len - 1) / (target - 1)`, so the first and
/// last samples are always kept.
pub fn downsample(data: &[f32], target: usize) -> Vec<f32> {
    if data.len() <= target {
        return data.to_vec();
    }
    match target {
        0 => Vec::new(),
        1 => vec![data[0]],
        _ => {
            let last = data.len() - 1;
            (0..target)
                .map(|i| data[i * last / (target - 1)])
                .collect()
        }
    }
}

/// Largest absolute sample, ignoring non-finite values
pub fn peak_amplitude(block: &[f32]) -> f32 {
    block
        .iter()
        .filter(|s| s.is_finite())
        .map(|s| s.abs())
        .fold(0.0f32, f32::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(len: usize, freq: f32, amplitude: f32, sample_rate: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate).sin())
            .collect()
    }

    #[test]
    fn test_log_bin_always_returns_requested_length() {
        for n in [0usize, 1, 2, 3, 7, 64, 1025] {
            for bins in [1usize, 8, 32, 128] {
                let spectrum = vec![1.0f32; n];
                assert_eq!(log_bin(&spectrum, bins).len(), bins, "n={} bins={}", n, bins);
            }
        }
    }

    #[test]
    fn test_log_bin_edges_non_decreasing_and_clipped() {
        for n in [1usize, 5, 100, 1025] {
            let edges = log_bin_edges(n, 128);
            assert!(edges.windows(2).all(|w| w[0] < w[1]));
            assert!(edges.iter().all(|&e| e <= n));
            assert_eq!(*edges.first().unwrap(), 1);
            assert_eq!(*edges.last().unwrap(), n);
        }
    }

    #[test]
    fn test_log_bin_pads_small_spectrum() {
        // 4 bins -> edges [1, 2, 4] after dedup: two real buckets, rest zero
        let binned = log_bin(&[9.0, 2.0, 4.0, 6.0], 8);
        assert_eq!(binned.len(), 8);
        assert_eq!(binned[0], 2.0);
        assert_eq!(binned[1], 5.0);
        assert!(binned[2..].iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_log_bin_empty_is_zeros() {
        assert_eq!(log_bin(&[], 4), vec![0.0; 4]);
    }

    #[test]
    fn test_downsample_identity_when_short() {
        let data = vec![0.1, -0.2, 0.3];
        assert_eq!(downsample(&data, 3), data);
        assert_eq!(downsample(&data, 10), data);
    }

    #[test]
    fn test_downsample_keeps_endpoints() {
        let data: Vec<f32> = (0..2048).map(|i| i as f32).collect();
        let out = downsample(&data, 128);
        assert_eq!(out.len(), 128);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[127], 2047.0);
        assert!(out.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_peak_amplitude() {
        assert_eq!(peak_amplitude(&[0.1, -0.7, 0.3]), 0.7);
        assert_eq!(peak_amplitude(&[]), 0.0);
        assert_eq!(peak_amplitude(&[f32::NAN, 0.2]), 0.2);
    }

    #[test]
    fn test_silence_yields_zero_buckets() {
        let mut builder = SpectralFrameBuilder::new(32, 16);
        let frame = builder.build(&vec![0.0; 2048], Arc::new(MediaSnapshot::default()));

        assert_eq!(frame.bins.len(), 32);
        assert!(frame.bins.iter().all(|&b| b == 0.0));
        assert_eq!(frame.waveform.len(), 16);
        assert_eq!(frame.peak, 0.0);
        // Decays toward zero but stays positive
        assert!(builder.running_peak() < INITIAL_RUNNING_PEAK);
        assert!(builder.running_peak() > 0.0);
    }

    #[test]
    fn test_running_peak_snaps_up_on_loud_block() {
        let mut builder = SpectralFrameBuilder::new(64, 64);
        let media = Arc::new(MediaSnapshot::default());
        builder.build(&vec![0.0; 2048], Arc::clone(&media));
        let quiet_peak = builder.running_peak();

        let frame = builder.build(&sine(2048, 440.0, 0.8, 44100.0), media);
        assert!(builder.running_peak() > quiet_peak);
        // The loudest bucket defines the new reference
        let max_bin = frame.bins.iter().copied().fold(0.0f32, f32::max);
        assert!((max_bin - 1.0).abs() < 1e-6);
        assert!(frame.bins.iter().all(|&b| (0.0..=1.0).contains(&b)));
    }

    #[test]
    fn test_running_peak_decays_slowly() {
        let mut builder = SpectralFrameBuilder::new(64, 64);
        let media = Arc::new(MediaSnapshot::default());
        builder.build(&sine(2048, 440.0, 0.8, 44100.0), Arc::clone(&media));
        let loud_peak = builder.running_peak();

        builder.build(&vec![0.0; 2048], media);
        let expected = loud_peak * PEAK_DECAY;
        assert!((builder.running_peak() - expected).abs() <= expected * 1e-5);
    }

    #[test]
    fn test_degenerate_block_never_panics() {
        let mut builder = SpectralFrameBuilder::new(16, 8);
        let media = Arc::new(MediaSnapshot::default());
        let frame = builder.build(&[], Arc::clone(&media));
        assert_eq!(frame.bins, vec![0.0; 16]);
        assert!(frame.waveform.is_empty());

        let frame = builder.build(&[f32::NAN, f32::INFINITY, 0.5], media);
        assert_eq!(frame.bins.len(), 16);
        assert!(frame.bins.iter().all(|b| b.is_finite()));
    }

    #[test]
    fn test_frame_wire_format() {
        let frame = SpectrumFrame {
            bins: vec![0.123456, 1.0],
            waveform: vec![-0.55555],
            peak: 0.987654,
            media: Arc::new(MediaSnapshot::default()),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["fft"][0], 0.1235);
        assert_eq!(json["waveform"][0], -0.5556);
        assert_eq!(json["peak"], 0.9877);
        assert_eq!(json["media"]["_profileVersion"], 0);
    }
}
