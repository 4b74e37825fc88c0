//! Feedback delay on a circular buffer
//!
//! The line is allocated once for [`MAX_DELAY_MS`]; runtime changes of the
//! delay time clamp to that capacity, so the audio thread never reallocates.

use serde::{Deserialize, Serialize};

use crate::processor::MAX_CHANNELS;

/// Longest supported delay
pub const MAX_DELAY_MS: f32 = 2000.0;

/// Feedback is kept strictly below one to stay stable
pub const MAX_FEEDBACK: f32 = 0.99;

/// Delay configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub enabled: bool,
    pub delay_ms: f32,
    pub feedback: f32,
    pub mix: f32,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: 150.0,
            feedback: 0.3,
            mix: 0.25,
        }
    }
}

impl DelayConfig {
    pub fn sanitized(mut self) -> Self {
        self.delay_ms = if self.delay_ms.is_finite() {
            self.delay_ms.clamp(0.0, MAX_DELAY_MS)
        } else {
            0.0
        };
        self.feedback = if self.feedback.is_finite() {
            self.feedback.clamp(0.0, MAX_FEEDBACK)
        } else {
            0.0
        };
        self.mix = if self.mix.is_finite() {
            self.mix.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// Multi-channel delay line
pub struct DelayLine {
    lines: [Vec<f32>; MAX_CHANNELS],
    capacity: usize,
    write_pos: usize,
    delay_samples: usize,
    config: DelayConfig,
    sample_rate: f32,
}

impl DelayLine {
    pub fn new(sample_rate: f32) -> Self {
        let capacity = (MAX_DELAY_MS * sample_rate / 1000.0).ceil() as usize + 1;
        let mut line = Self {
            lines: core::array::from_fn(|_| vec![0.0; capacity]),
            capacity,
            write_pos: 0,
            delay_samples: 1,
            config: DelayConfig::default(),
            sample_rate,
        };
        line.delay_samples = line.samples_for(line.config.delay_ms);
        line
    }

    /// Delay time in samples, clamped to the allocated line
    fn samples_for(&self, delay_ms: f32) -> usize {
        let samples = (delay_ms * self.sample_rate / 1000.0).round() as usize;
        samples.clamp(1, self.capacity - 1)
    }

    pub fn set_config(&mut self, config: &DelayConfig) {
        let config = config.sanitized();
        if config == self.config {
            return;
        }
        if config.enabled && !self.config.enabled {
            // Start from an empty line rather than replaying stale audio
            self.reset();
        }
        self.delay_samples = self.samples_for(config.delay_ms);
        self.config = config;
    }

    pub fn config(&self) -> &DelayConfig {
        &self.config
    }

    /// Current delay in samples
    pub fn delay_samples(&self) -> usize {
        self.delay_samples
    }

    /// # Real-time Safety
    /// No allocations, O(n) time.
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        if !self.config.enabled {
            return;
        }
        let channels = channels.clamp(1, MAX_CHANNELS);
        let DelayConfig { feedback, mix, .. } = self.config;
        let dry_gain = 1.0 - mix;

        for frame in buffer.chunks_exact_mut(channels) {
            let read_pos = (self.write_pos + self.capacity - self.delay_samples) % self.capacity;
            for (ch, sample) in frame.iter_mut().enumerate() {
                let line = &mut self.lines[ch];
                let wet = line[read_pos];
                line[self.write_pos] = *sample + feedback * wet;
                *sample = *sample * dry_gain + wet * mix;
            }
            self.write_pos = (self.write_pos + 1) % self.capacity;
        }
    }

    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.write_pos = 0;
    }
}
