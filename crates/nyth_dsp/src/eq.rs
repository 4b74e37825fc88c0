//! 10-Band Peaking Equalizer
//!
//! Implements a cascade of BiQuad filters for audio equalization.
//! Based on the RBJ (Robert Bristow-Johnson) Audio EQ Cookbook.
//!
//! The audio thread never edits an [`EqualizerState`]; it receives whole
//! snapshots and [`Equalizer::apply_state`] recomputes coefficients only for
//! the bands that differ from the previously applied snapshot.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, Hertz, Type, Q_BUTTERWORTH_F32};
use serde::{Deserialize, Serialize};

use crate::error::DspError;
use crate::processor::{AudioProcessor, ProcessContext, MAX_CHANNELS};
use crate::util::db_to_linear;

/// Number of bands in every equalizer instance
pub const NUM_BANDS: usize = 10;

/// Band gain limits in dB
pub const MIN_GAIN_DB: f32 = -18.0;
pub const MAX_GAIN_DB: f32 = 18.0;

/// Standard EQ band frequencies (Hz) - octave centers
pub const EQ_BANDS: [f32; NUM_BANDS] = [
    31.25,   // Sub-bass
    62.5,    // Bass
    125.0,   // Low-mid
    250.0,   // Mid
    500.0,   // Mid
    1000.0,  // Mid-high
    2000.0,  // High-mid
    4000.0,  // Presence
    8000.0,  // Brilliance
    16000.0, // Air
];

/// Filter type for each EQ band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandType {
    Peak,
}

/// Single EQ band configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub frequency: f32,
    pub gain_db: f32,
    pub q: f32,
    pub band_type: BandType,
    pub enabled: bool,
}

impl Band {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency,
            gain_db: 0.0,
            q: Q_BUTTERWORTH_F32, // ~0.707, gives smooth response
            band_type: BandType::Peak,
            enabled: true,
        }
    }

    /// Generate BiQuad coefficients for this band
    fn to_coefficients(self, sample_rate: f32) -> Result<Coefficients<f32>, DspError> {
        let invalid = || DspError::InvalidCoefficients {
            frequency: self.frequency,
            sample_rate,
        };

        // The cookbook formulas are only defined below Nyquist
        if self.q <= 0.0 || self.frequency >= sample_rate * 0.5 {
            return Err(invalid());
        }

        let fs = Hertz::<f32>::from_hz(sample_rate).map_err(|_| invalid())?;
        let f0 = Hertz::<f32>::from_hz(self.frequency).map_err(|_| invalid())?;

        match self.band_type {
            BandType::Peak => {
                Coefficients::<f32>::from_params(Type::PeakingEQ(self.gain_db), fs, f0, self.q)
                    .map_err(|_| invalid())
            }
        }
    }
}

/// Pass-through coefficients used for bands that cannot be realised
pub(crate) fn identity_coefficients() -> Coefficients<f32> {
    Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    }
}

/// Complete EQ configuration for all 10 bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualizerState {
    pub bands: [Band; NUM_BANDS],
    pub master_gain_db: f32,
    pub enabled: bool,
}

impl Default for EqualizerState {
    fn default() -> Self {
        Self {
            bands: core::array::from_fn(|i| Band::new(EQ_BANDS[i])),
            master_gain_db: 0.0,
            enabled: true,
        }
    }
}

impl EqualizerState {
    /// Set gain for a specific band (0-9), clamped to +/-18dB
    pub fn set_band_gain(&mut self, band_index: usize, gain_db: f32) -> Result<(), DspError> {
        let band = self
            .bands
            .get_mut(band_index)
            .ok_or(DspError::InvalidBandIndex(band_index))?;
        band.gain_db = clamp_gain(gain_db);
        Ok(())
    }

    /// Replace all ten band gains at once
    ///
    /// Nothing is modified when the slice does not hold exactly 10 values.
    pub fn apply_gains(&mut self, gains: &[f32]) -> Result<(), DspError> {
        if gains.len() != NUM_BANDS {
            return Err(DspError::InvalidPresetLength(gains.len()));
        }
        for (band, &gain) in self.bands.iter_mut().zip(gains) {
            band.gain_db = clamp_gain(gain);
        }
        Ok(())
    }

    /// Get all gains (useful for UI serialization)
    pub fn gains(&self) -> [f32; NUM_BANDS] {
        core::array::from_fn(|i| self.bands[i].gain_db)
    }

    /// Whether every band sits at 0dB
    pub fn is_flat(&self) -> bool {
        self.bands.iter().all(|b| b.gain_db == 0.0)
    }
}

#[inline]
fn clamp_gain(gain_db: f32) -> f32 {
    if gain_db.is_nan() {
        0.0
    } else {
        gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB)
    }
}

/// The main equalizer processor
///
/// Holds the filter state and processes audio samples.
/// Designed for real-time use: no allocations in `process()`.
pub struct Equalizer {
    // DirectForm2Transposed: better numerical stability than DF1
    filters: [[DirectForm2Transposed<f32>; NUM_BANDS]; MAX_CHANNELS],
    /// Bands whose coefficients resolved to pass-through
    bypassed: [bool; NUM_BANDS],
    applied: EqualizerState,
    sample_rate: f32,
    master_gain_linear: f32,
    last_recomputed: usize,
}

impl Equalizer {
    /// Create a new equalizer with default flat response
    pub fn new(sample_rate: f32) -> Self {
        let applied = EqualizerState::default();
        let mut bypassed = [false; NUM_BANDS];
        let coeffs: [Coefficients<f32>; NUM_BANDS] = core::array::from_fn(|i| {
            applied.bands[i]
                .to_coefficients(sample_rate)
                .unwrap_or_else(|_| {
                    bypassed[i] = true;
                    identity_coefficients()
                })
        });

        let filters = core::array::from_fn(|_| {
            core::array::from_fn(|i| DirectForm2Transposed::<f32>::new(coeffs[i]))
        });

        Self {
            filters,
            bypassed,
            applied,
            sample_rate,
            master_gain_linear: 1.0,
            last_recomputed: 0,
        }
    }

    /// Apply a published snapshot
    ///
    /// Only bands that changed since the previous snapshot get new
    /// coefficients. Toggling `enabled` clears the delay lines.
    pub fn apply_state(&mut self, state: &EqualizerState) {
        let mut recomputed = 0;
        for i in 0..NUM_BANDS {
            let band = state.bands[i];
            if band == self.applied.bands[i] {
                continue;
            }
            let coeffs = band.to_coefficients(self.sample_rate);
            self.bypassed[i] = coeffs.is_err();
            let coeffs = coeffs.unwrap_or_else(|_| identity_coefficients());
            for channel in &mut self.filters {
                channel[i].update_coefficients(coeffs);
            }
            recomputed += 1;
        }

        if state.enabled != self.applied.enabled {
            self.reset();
        }
        if state.master_gain_db != self.applied.master_gain_db {
            self.master_gain_linear = db_to_linear(state.master_gain_db);
        }

        self.last_recomputed = recomputed;
        self.applied = *state;
    }

    /// Process one sample of one channel through the cascade
    ///
    /// # Real-time Safety
    /// This function performs NO allocations and NO syscalls.
    #[inline]
    pub fn process_sample(&mut self, channel: usize, sample: f32) -> f32 {
        if !self.applied.enabled {
            return sample;
        }

        let mut x = sample;
        let filters = &mut self.filters[channel.min(MAX_CHANNELS - 1)];
        for (i, filter) in filters.iter_mut().enumerate() {
            if self.applied.bands[i].enabled && !self.bypassed[i] {
                x = filter.run(x);
            }
        }

        x * self.master_gain_linear
    }

    /// Process an interleaved buffer in-place
    ///
    /// # Real-time Safety
    /// No allocations. O(n) where n = buffer length.
    #[inline]
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        if !self.applied.enabled {
            return;
        }
        let channels = channels.clamp(1, MAX_CHANNELS);
        for frame in buffer.chunks_exact_mut(channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = self.process_sample(ch, *sample);
            }
        }
    }

    /// Currently applied snapshot
    pub fn state(&self) -> &EqualizerState {
        &self.applied
    }

    /// Number of bands recomputed by the last `apply_state`
    pub fn last_recomputed(&self) -> usize {
        self.last_recomputed
    }

    /// Get sample rate
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Reset filter state (clear delay lines)
    pub fn reset(&mut self) {
        for channel in &mut self.filters {
            for filter in channel.iter_mut() {
                filter.reset_state();
            }
        }
    }
}

impl AudioProcessor for Equalizer {
    fn process(&mut self, buffer: &mut [f32], context: &ProcessContext) {
        self.process_interleaved(buffer, context.channels);
    }

    fn reset(&mut self) {
        Equalizer::reset(self);
    }

    fn name(&self) -> &'static str {
        "10-Band Equalizer"
    }

    fn is_enabled(&self) -> bool {
        self.applied.enabled
    }
}
