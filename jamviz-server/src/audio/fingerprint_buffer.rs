//! Circular sample buffer feeding acoustic identification
//!
//! The analysis task writes every capture block here; the fingerprint source
//! takes a linear snapshot when the throttle allows. Both sides hold the lock
//! only for the duration of a copy.

use jamviz_common::{config::FingerprintConfig, TrackCandidate};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Buffer shared between the analysis task (writer) and the fingerprint source (reader)
pub type SharedFingerprintBuffer = Arc<Mutex<FingerprintBuffer>>;

/// Fixed-capacity `i16` ring of the most recent audio
#[derive(Debug)]
pub struct FingerprintBuffer {
    samples: Vec<i16>,
    cursor: usize,
    filled: bool,
    sample_rate: u32,
    min_query_samples: usize,
    min_identify_samples: usize,
    cooldown: Duration,
    last_attempt: Option<Instant>,
    last_result: Option<TrackCandidate>,
}

impl FingerprintBuffer {
    pub fn new(sample_rate: u32, config: &FingerprintConfig) -> Self {
        let rate = sample_rate as f64;
        let capacity = ((rate * config.buffer_seconds) as usize).max(1);
        Self {
            samples: vec![0; capacity],
            cursor: 0,
            filled: false,
            sample_rate,
            min_query_samples: (rate * config.min_query_seconds) as usize,
            min_identify_samples: (rate * config.min_identify_seconds) as usize,
            cooldown: Duration::from_secs_f64(config.query_cooldown_secs.max(0.0)),
            last_attempt: None,
            last_result: None,
        }
    }

    pub fn shared(sample_rate: u32, config: &FingerprintConfig) -> SharedFingerprintBuffer {
        Arc::new(Mutex::new(Self::new(sample_rate, config)))
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    /// Samples currently available, `min(fed, capacity)`
    pub fn len(&self) -> usize {
        if self.filled {
            self.samples.len()
        } else {
            self.cursor
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_filled(&self) -> bool {
        self.filled
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Seconds of audio currently buffered
    pub fn buffered_seconds(&self) -> f64 {
        self.len() as f64 / self.sample_rate.max(1) as f64
    }

    /// Append samples, overwriting the oldest once full
    pub fn feed(&mut self, samples: &[f32]) {
        let capacity = self.samples.len();
        for &sample in samples {
            self.samples[self.cursor] = to_i16(sample);
            self.cursor += 1;
            if self.cursor == capacity {
                self.cursor = 0;
                self.filled = true;
            }
        }
    }

    /// Enough audio buffered and the cooldown since the last attempt has elapsed
    pub fn can_query(&self) -> bool {
        self.can_query_at(Instant::now())
    }

    pub fn can_query_at(&self, now: Instant) -> bool {
        if self.len() < self.min_query_samples {
            return false;
        }
        match self.last_attempt {
            Some(at) => now.saturating_duration_since(at) >= self.cooldown,
            None => true,
        }
    }

    /// Linearized copy of the buffered audio, oldest first
    pub fn snapshot(&self) -> Vec<i16> {
        if self.filled {
            let mut linear = Vec::with_capacity(self.samples.len());
            linear.extend_from_slice(&self.samples[self.cursor..]);
            linear.extend_from_slice(&self.samples[..self.cursor]);
            linear
        } else {
            self.samples[..self.cursor].to_vec()
        }
    }

    /// Start an identification attempt
    ///
    /// The attempt time is recorded before anything else, so a rejected or
    /// failed attempt still counts against the cooldown. Returns `None` when
    /// the snapshot is too short to identify.
    pub fn begin_attempt_at(&mut self, now: Instant) -> Option<Vec<i16>> {
        self.last_attempt = Some(now);
        if self.len() < self.min_identify_samples || self.is_empty() {
            return None;
        }
        Some(self.snapshot())
    }

    pub fn begin_attempt(&mut self) -> Option<Vec<i16>> {
        self.begin_attempt_at(Instant::now())
    }

    pub fn record_result(&mut self, result: Option<TrackCandidate>) {
        self.last_result = result;
    }

    pub fn last_result(&self) -> Option<&TrackCandidate> {
        self.last_result.as_ref()
    }

    /// Forget buffered audio and the last result
    ///
    /// The cooldown is left alone; a freshly reset buffer must refill to the
    /// query minimum before the next attempt anyway.
    pub fn reset(&mut self) {
        self.samples.iter_mut().for_each(|s| *s = 0);
        self.cursor = 0;
        self.filled = false;
        self.last_result = None;
    }
}

fn to_i16(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}
