//! Feed-forward compressor with envelope follower
//!
//! Stereo-linked: one detector drives the gain of every channel.

use serde::{Deserialize, Serialize};

use crate::processor::MAX_CHANNELS;
use crate::util::{db_to_linear, finite_or, linear_to_db, smooth, time_constant_to_coeff};

/// Release of the peak detector that feeds the gain computer
const DETECTOR_RELEASE_MS: f32 = 20.0;

const MIN_THRESHOLD_DB: f32 = -60.0;
const MAX_MAKEUP_DB: f32 = 24.0;
const MAX_TIME_MS: f32 = 5000.0;

/// Compressor configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorConfig {
    pub enabled: bool,
    pub threshold_db: f32,
    pub ratio: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub makeup_db: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_db: -18.0,
            ratio: 3.0,
            attack_ms: 10.0,
            release_ms: 100.0,
            makeup_db: 0.0,
        }
    }
}

impl CompressorConfig {
    /// Whether every numeric field is a real number
    pub fn is_finite(&self) -> bool {
        [
            self.threshold_db,
            self.ratio,
            self.attack_ms,
            self.release_ms,
            self.makeup_db,
        ]
        .iter()
        .all(|v| v.is_finite())
    }

    /// Clamp every field into its supported range; non-finite values fall
    /// back to the defaults
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.threshold_db = finite_or(self.threshold_db, defaults.threshold_db).clamp(MIN_THRESHOLD_DB, 0.0);
        self.ratio = finite_or(self.ratio, 1.0).max(1.0);
        self.attack_ms = finite_or(self.attack_ms, defaults.attack_ms).clamp(0.0, MAX_TIME_MS);
        self.release_ms = finite_or(self.release_ms, defaults.release_ms).clamp(0.0, MAX_TIME_MS);
        self.makeup_db = finite_or(self.makeup_db, defaults.makeup_db).clamp(0.0, MAX_MAKEUP_DB);
        self
    }
}

/// Static gain computer
///
/// For `input_db > threshold_db`: `excess - excess / ratio`, otherwise 0.
#[inline]
pub fn gain_reduction_db(input_db: f32, threshold_db: f32, ratio: f32) -> f32 {
    if input_db <= threshold_db {
        return 0.0;
    }
    let excess = input_db - threshold_db;
    excess - excess / ratio.max(1.0)
}

/// Compressor state
pub struct Compressor {
    config: CompressorConfig,
    sample_rate: f32,
    detector_release: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
    reduction_db: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32) -> Self {
        let mut compressor = Self {
            config: CompressorConfig::default(),
            sample_rate,
            detector_release: time_constant_to_coeff(DETECTOR_RELEASE_MS, sample_rate),
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            reduction_db: 0.0,
        };
        compressor.update_coefficients();
        compressor
    }

    pub fn set_config(&mut self, config: &CompressorConfig) {
        let config = config.sanitized();
        if config == self.config {
            return;
        }
        if config.enabled != self.config.enabled {
            self.reset();
        }
        self.config = config;
        self.update_coefficients();
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = time_constant_to_coeff(self.config.attack_ms, self.sample_rate);
        self.release_coeff = time_constant_to_coeff(self.config.release_ms, self.sample_rate);
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    /// Smoothed gain reduction currently applied, in dB
    pub fn gain_reduction(&self) -> f32 {
        self.reduction_db
    }

    /// # Real-time Safety
    /// No allocations, O(n) time.
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        if !self.config.enabled {
            return;
        }
        let channels = channels.clamp(1, MAX_CHANNELS);
        let CompressorConfig {
            threshold_db,
            ratio,
            makeup_db,
            ..
        } = self.config;

        for frame in buffer.chunks_exact_mut(channels) {
            let level = frame.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));

            // Peak detector: instant attack, short release
            self.envelope = if level > self.envelope {
                level
            } else {
                smooth(self.envelope, level, self.detector_release)
            };

            let target = gain_reduction_db(linear_to_db(self.envelope), threshold_db, ratio);
            let coeff = if target > self.reduction_db {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.reduction_db = smooth(self.reduction_db, target, coeff);

            let gain = db_to_linear(makeup_db - self.reduction_db);
            for sample in frame.iter_mut() {
                *sample *= gain;
            }
        }
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
        self.reduction_db = 0.0;
    }
}
