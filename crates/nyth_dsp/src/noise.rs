//! Noise Reduction Stage
//!
//! First stage of the chain. Three modes, picked once per buffer:
//!
//! - `Off`: bypass
//! - `Expander`: high-pass + downward expander (noise gate with a floor)
//! - `RnNoise`: the STFT [`SpectralDenoiser`]
//!
//! Any change of the effective mode (mode switch, enable toggle, or a fallback
//! because the denoiser is missing) is crossfaded linearly over one buffer.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, Hertz, Type, Q_BUTTERWORTH_F32};
use serde::{Deserialize, Serialize};

use crate::denoise::SpectralDenoiser;
use crate::eq::identity_coefficients;
use crate::processor::{AudioProcessor, ProcessContext, MAX_CHANNELS};
use crate::util::{db_to_linear, linear_to_db, smooth, time_constant_to_coeff};

pub const MIN_HIGH_PASS_HZ: f32 = 20.0;
pub const MAX_HIGH_PASS_HZ: f32 = 1000.0;
pub const MAX_AGGRESSIVENESS: f32 = 3.0;

/// Gain smoothing attack as a fraction of the envelope attack
const ATTACK_GAIN_FACTOR: f32 = 0.5;
/// Shortest gain smoothing release
const MIN_RELEASE_GAIN_MS: f32 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoiseMode {
    Off,
    #[default]
    Expander,
    RnNoise,
}

/// Non-fatal health of the stage, reported to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Active,
    Bypassed,
    /// RnNoise was requested but the denoiser is not available
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseReductionConfig {
    pub enabled: bool,
    pub mode: NoiseMode,
    /// Spectral over-subtraction scale, 0..=3
    pub aggressiveness: f32,
    pub high_pass_enabled: bool,
    pub high_pass_hz: f32,
    pub threshold_db: f32,
    pub ratio: f32,
    /// Lowest gain the expander applies
    pub floor_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
}

impl Default for NoiseReductionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: NoiseMode::Expander,
            aggressiveness: 1.0,
            high_pass_enabled: true,
            high_pass_hz: 100.0,
            threshold_db: -30.0,
            ratio: 2.0,
            floor_db: -40.0,
            attack_ms: 10.0,
            release_ms: 50.0,
        }
    }
}

impl NoiseReductionConfig {
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        let finite = |value: f32, fallback: f32| if value.is_finite() { value } else { fallback };

        self.aggressiveness = finite(self.aggressiveness, defaults.aggressiveness).clamp(0.0, MAX_AGGRESSIVENESS);
        self.high_pass_hz = finite(self.high_pass_hz, defaults.high_pass_hz).clamp(MIN_HIGH_PASS_HZ, MAX_HIGH_PASS_HZ);
        self.threshold_db = finite(self.threshold_db, defaults.threshold_db).min(0.0);
        self.ratio = finite(self.ratio, defaults.ratio).max(1.0);
        self.floor_db = finite(self.floor_db, defaults.floor_db).min(0.0);
        self.attack_ms = finite(self.attack_ms, defaults.attack_ms).max(0.0);
        self.release_ms = finite(self.release_ms, defaults.release_ms).max(0.0);
        self
    }
}

/// Downward expander with an optional high-pass in front
pub struct Expander {
    config: NoiseReductionConfig,
    sample_rate: f32,
    high_pass: [DirectForm2Transposed<f32>; MAX_CHANNELS],
    env_attack: f32,
    env_release: f32,
    gain_attack: f32,
    gain_release: f32,
    envelope: f32,
    gain: f32,
}

impl Expander {
    pub fn new(sample_rate: f32) -> Self {
        let config = NoiseReductionConfig::default();
        let coeffs = high_pass_coefficients(config.high_pass_hz, sample_rate);
        let mut expander = Self {
            config,
            sample_rate,
            high_pass: core::array::from_fn(|_| DirectForm2Transposed::<f32>::new(coeffs)),
            env_attack: 0.0,
            env_release: 0.0,
            gain_attack: 0.0,
            gain_release: 0.0,
            envelope: 0.0,
            gain: 1.0,
        };
        expander.update_time_constants();
        expander
    }

    pub fn set_config(&mut self, config: &NoiseReductionConfig) {
        if config.high_pass_hz != self.config.high_pass_hz {
            let coeffs = high_pass_coefficients(config.high_pass_hz, self.sample_rate);
            for filter in &mut self.high_pass {
                filter.update_coefficients(coeffs);
            }
        }
        self.config = *config;
        self.update_time_constants();
    }

    fn update_time_constants(&mut self) {
        let sr = self.sample_rate;
        self.env_attack = time_constant_to_coeff(self.config.attack_ms, sr);
        self.env_release = time_constant_to_coeff(self.config.release_ms, sr);
        self.gain_attack = time_constant_to_coeff(self.config.attack_ms * ATTACK_GAIN_FACTOR, sr);
        self.gain_release = time_constant_to_coeff(self.config.release_ms.max(MIN_RELEASE_GAIN_MS), sr);
    }

    /// Static curve: gain in dB for a detected level
    #[inline]
    pub fn gain_db(&self, level_db: f32) -> f32 {
        let NoiseReductionConfig {
            threshold_db,
            ratio,
            floor_db,
            ..
        } = self.config;
        if level_db >= threshold_db {
            return 0.0;
        }
        ((level_db - threshold_db) * (ratio - 1.0)).max(floor_db)
    }

    /// Currently applied linear gain
    pub fn current_gain(&self) -> f32 {
        self.gain
    }

    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        let channels = channels.clamp(1, MAX_CHANNELS);
        let high_pass = self.config.high_pass_enabled;

        for frame in buffer.chunks_exact_mut(channels) {
            let mut level = 0.0_f32;
            for (ch, sample) in frame.iter_mut().enumerate() {
                if high_pass {
                    *sample = self.high_pass[ch].run(*sample);
                }
                level = level.max(sample.abs());
            }

            let coeff = if level > self.envelope {
                self.env_attack
            } else {
                self.env_release
            };
            self.envelope = smooth(self.envelope, level, coeff);

            let target = db_to_linear(self.gain_db(linear_to_db(self.envelope)));
            let coeff = if target > self.gain {
                self.gain_attack
            } else {
                self.gain_release
            };
            self.gain = smooth(self.gain, target, coeff);

            for sample in frame.iter_mut() {
                *sample *= self.gain;
            }
        }
    }

    pub fn reset(&mut self) {
        for filter in &mut self.high_pass {
            filter.reset_state();
        }
        self.envelope = 0.0;
        self.gain = 1.0;
    }
}

fn high_pass_coefficients(cutoff_hz: f32, sample_rate: f32) -> Coefficients<f32> {
    let cutoff = cutoff_hz.clamp(MIN_HIGH_PASS_HZ, MAX_HIGH_PASS_HZ);
    let coeffs = Hertz::<f32>::from_hz(sample_rate).ok().and_then(|fs| {
        let f0 = Hertz::<f32>::from_hz(cutoff).ok()?;
        Coefficients::<f32>::from_params(Type::HighPass, fs, f0, Q_BUTTERWORTH_F32).ok()
    });
    coeffs.unwrap_or_else(identity_coefficients)
}

/// Noise suppression in front of the equalizer
pub struct NoiseReductionStage {
    config: NoiseReductionConfig,
    expander: Expander,
    denoiser: Option<SpectralDenoiser>,
    /// Mode that produced the previous buffer
    current: NoiseMode,
    /// Holds the outgoing mode's output during a crossfade
    scratch: Vec<f32>,
}

impl NoiseReductionStage {
    /// `max_block_samples` bounds the interleaved block a crossfade handles at
    /// once; `denoiser` is `None` when the spectral model failed to load.
    pub fn new(sample_rate: f32, max_block_samples: usize, denoiser: Option<SpectralDenoiser>) -> Self {
        // Even length keeps stereo frames whole
        let scratch_len = (max_block_samples.max(MAX_CHANNELS) + 1) & !1;
        let mut stage = Self {
            config: NoiseReductionConfig::default(),
            expander: Expander::new(sample_rate),
            denoiser,
            current: NoiseMode::Off,
            scratch: vec![0.0; scratch_len],
        };
        stage.current = stage.effective_mode();
        stage
    }

    pub fn set_config(&mut self, config: &NoiseReductionConfig) {
        let config = config.sanitized();
        if config == self.config {
            return;
        }
        self.expander.set_config(&config);
        if let Some(denoiser) = self.denoiser.as_mut() {
            denoiser.set_aggressiveness(config.aggressiveness);
        }
        self.config = config;
    }

    pub fn config(&self) -> &NoiseReductionConfig {
        &self.config
    }

    pub fn has_denoiser(&self) -> bool {
        self.denoiser.is_some()
    }

    /// Mode that actually runs, after enable flag and fallbacks
    pub fn effective_mode(&self) -> NoiseMode {
        match (self.config.enabled, self.config.mode) {
            (false, _) => NoiseMode::Off,
            (true, NoiseMode::RnNoise) if self.denoiser.is_none() => NoiseMode::Off,
            (true, mode) => mode,
        }
    }

    pub fn status(&self) -> StageStatus {
        status_for(&self.config, self.denoiser.is_some())
    }

    fn run_mode(&mut self, mode: NoiseMode, buffer: &mut [f32], channels: usize) {
        match mode {
            NoiseMode::Off => {}
            NoiseMode::Expander => self.expander.process_interleaved(buffer, channels),
            NoiseMode::RnNoise => {
                if let Some(denoiser) = self.denoiser.as_mut() {
                    denoiser.process_interleaved(buffer, channels);
                }
            }
        }
    }

    fn reset_mode(&mut self, mode: NoiseMode) {
        match mode {
            NoiseMode::Off => {}
            NoiseMode::Expander => self.expander.reset(),
            NoiseMode::RnNoise => {
                if let Some(denoiser) = self.denoiser.as_mut() {
                    denoiser.reset();
                }
            }
        }
    }

    /// Linear fade from `from`'s output to `to`'s output across `buffer`
    fn crossfade(&mut self, from: NoiseMode, to: NoiseMode, buffer: &mut [f32], channels: usize) {
        let total_frames = (buffer.len() / channels).max(1) as f32;
        let mut scratch = std::mem::take(&mut self.scratch);
        let block_len = scratch.len() - scratch.len() % channels;
        let mut done = 0usize;

        for block in buffer.chunks_mut(block_len) {
            let old = &mut scratch[..block.len()];
            old.copy_from_slice(block);
            self.run_mode(from, old, channels);
            self.run_mode(to, block, channels);

            for (i, (new_frame, old_frame)) in block
                .chunks_exact_mut(channels)
                .zip(old.chunks_exact(channels))
                .enumerate()
            {
                let t = (done + i + 1) as f32 / total_frames;
                for (y, &x_old) in new_frame.iter_mut().zip(old_frame) {
                    *y = *y * t + x_old * (1.0 - t);
                }
            }
            done += block.len() / channels;
        }

        self.scratch = scratch;
    }
}

/// Status a given configuration results in
pub fn status_for(config: &NoiseReductionConfig, denoiser_available: bool) -> StageStatus {
    match (config.enabled, config.mode) {
        (false, _) | (true, NoiseMode::Off) => StageStatus::Bypassed,
        (true, NoiseMode::RnNoise) if !denoiser_available => StageStatus::Degraded,
        (true, _) => StageStatus::Active,
    }
}

impl AudioProcessor for NoiseReductionStage {
    /// # Real-time Safety
    /// No allocations; the crossfade scratch is preallocated.
    fn process(&mut self, buffer: &mut [f32], context: &ProcessContext) {
        let channels = context.channels.clamp(1, MAX_CHANNELS);
        let target = self.effective_mode();

        if target == self.current {
            self.run_mode(target, buffer, channels);
            return;
        }

        self.reset_mode(target);
        self.crossfade(self.current, target, buffer, channels);
        self.current = target;
    }

    fn reset(&mut self) {
        self.expander.reset();
        if let Some(denoiser) = self.denoiser.as_mut() {
            denoiser.reset();
        }
    }

    fn name(&self) -> &'static str {
        "Noise Reduction"
    }

    fn is_enabled(&self) -> bool {
        self.effective_mode() != NoiseMode::Off
    }
}
