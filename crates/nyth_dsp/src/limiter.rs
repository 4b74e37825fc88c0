//! Soft-Knee Limiter
//!
//! Keeps the output below a hard ceiling. With the soft knee enabled, gain
//! reduction starts `knee_width_db` below the ceiling and bends smoothly
//! towards it instead of switching abruptly at the threshold.
//!
//! # Algorithm
//!
//! Works on the per-frame peak level in dB (channels are linked so the
//! stereo image does not shift):
//! - Below `knee_start = threshold - knee`: unity gain
//! - Above: `out = knee_start + knee * tanh((in - knee_start) / knee)`
//!
//! tanh has slope 1 at the origin and approaches 1.0 asymptotically, so the
//! curve joins the linear region without a corner and never crosses the
//! ceiling. Attack is instant; the gain recovers with a fixed release.

use crate::processor::MAX_CHANNELS;
use crate::util::{db_to_linear, linear_to_db, smooth, time_constant_to_coeff};

/// Gain recovery time after a peak
pub const LIMITER_RELEASE_MS: f32 = 50.0;

/// Limiter with optional soft knee
#[derive(Debug, Clone)]
pub struct Limiter {
    threshold_db: f32,
    ceiling: f32,
    knee_width_db: f32,
    soft_knee: bool,
    release_coeff: f32,
    gain: f32,
}

impl Limiter {
    /// Create a new limiter
    ///
    /// # Arguments
    /// * `threshold_db` - Ceiling in dBFS (clamped to <= 0)
    /// * `knee_width_db` - Width of the soft knee below the ceiling
    /// * `soft_knee` - Ramp in gradually instead of hard clipping
    /// * `sample_rate` - Sample rate in Hz
    pub fn new(threshold_db: f32, knee_width_db: f32, soft_knee: bool, sample_rate: f32) -> Self {
        let mut limiter = Self {
            threshold_db: 0.0,
            ceiling: 1.0,
            knee_width_db: 0.0,
            soft_knee,
            release_coeff: time_constant_to_coeff(LIMITER_RELEASE_MS, sample_rate),
            gain: 1.0,
        };
        limiter.set_params(threshold_db, knee_width_db, soft_knee);
        limiter
    }

    /// Update threshold and knee
    pub fn set_params(&mut self, threshold_db: f32, knee_width_db: f32, soft_knee: bool) {
        self.threshold_db = threshold_db.min(0.0);
        self.ceiling = db_to_linear(self.threshold_db);
        self.knee_width_db = knee_width_db.max(0.0);
        self.soft_knee = soft_knee;
    }

    /// Ceiling in linear scale
    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Currently applied gain (1.0 = no reduction)
    pub fn current_gain(&self) -> f32 {
        self.gain
    }

    /// Target gain for a given peak level
    #[inline]
    fn target_gain(&self, level: f32) -> f32 {
        if self.soft_knee && self.knee_width_db > 0.0 {
            let in_db = linear_to_db(level);
            let out_db = soft_knee_db(in_db, self.threshold_db, self.knee_width_db);
            if out_db >= in_db {
                1.0
            } else {
                db_to_linear(out_db - in_db)
            }
        } else if level > self.ceiling {
            self.ceiling / level
        } else {
            1.0
        }
    }

    /// Process an interleaved buffer in-place
    ///
    /// # Real-time Safety
    /// No allocations, O(n) time.
    #[inline]
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let ceiling = self.ceiling;

        for frame in buffer.chunks_exact_mut(channels) {
            let level = frame.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
            let target = self.target_gain(level);

            if target < self.gain {
                self.gain = target;
            } else if target > self.gain {
                self.gain = smooth(self.gain, target, self.release_coeff).min(target);
            }

            for sample in frame.iter_mut() {
                // Final clamp absorbs float rounding in the dB round trip
                *sample = (*sample * self.gain).clamp(-ceiling, ceiling);
            }
        }
    }

    pub fn reset(&mut self) {
        self.gain = 1.0;
    }
}

/// Soft-knee transfer curve in dB
#[inline]
pub fn soft_knee_db(in_db: f32, threshold_db: f32, knee_width_db: f32) -> f32 {
    let knee_start = threshold_db - knee_width_db;
    if in_db <= knee_start || knee_width_db <= 0.0 {
        return in_db.min(threshold_db);
    }
    knee_start + knee_width_db * ((in_db - knee_start) / knee_width_db).tanh()
}
