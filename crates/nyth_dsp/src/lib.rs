//! Nyth DSP - Digital Signal Processing Module
//!
//! The processing stages of the Nyth audio engine:
//! - Noise reduction (downward expander or STFT spectral denoiser)
//! - 10-band peaking equalizer using BiQuad filters
//! - Compressor and feedback delay
//! - Safety stage: DC removal, soft-knee limiter, feedback detection
//! - FFT spectrum analyzer for visualization
//!
//! # Architecture
//!
//! Every stage follows the "no allocation in audio callback" rule. Buffers are
//! sized at construction; configuration arrives as whole `Copy` snapshots
//! that stages apply between buffers.

mod compressor;
mod delay;
mod denoise;
mod effects;
mod eq;
mod error;
mod limiter;
mod noise;
mod presets;
mod processor;
mod safety;
mod spectrum;
pub mod util;

pub use compressor::{gain_reduction_db, Compressor, CompressorConfig};
pub use delay::{DelayConfig, DelayLine, MAX_DELAY_MS};
pub use denoise::{SpectralDenoiser, DENOISER_LATENCY};
pub use effects::EffectsStage;
pub use eq::{Band, BandType, Equalizer, EqualizerState, EQ_BANDS, MAX_GAIN_DB, MIN_GAIN_DB, NUM_BANDS};
pub use error::DspError;
pub use limiter::{soft_knee_db, Limiter};
pub use noise::{status_for, Expander, NoiseMode, NoiseReductionConfig, NoiseReductionStage, StageStatus};
pub use presets::{Preset, PRESETS};
pub use processor::{AudioProcessor, ProcessContext, MAX_CHANNELS};
pub use safety::{
    AudioSafetyConfig, AudioSafetyReport, AudioSafetyStage, FeedbackDetector, SafetyLevels,
    SafetyStatistics,
};
pub use spectrum::{SpectrumAnalyzer, SpectrumFrame, DEFAULT_INTERVAL_MS, FFT_SIZE, NUM_BINS};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify all public types are accessible
        let _state = EqualizerState::default();
        let _eq = Equalizer::new(48000.0);
        let _effects = EffectsStage::new(48000.0);
        let _safety = AudioSafetyStage::new(48000.0);
        let _noise = NoiseReductionStage::new(48000.0, 1024, None);
        let _frame = SpectrumFrame::default();
    }

    #[test]
    fn test_stage_names() {
        let stages: [&dyn AudioProcessor; 4] = [
            &NoiseReductionStage::new(48000.0, 1024, None),
            &Equalizer::new(48000.0),
            &EffectsStage::new(48000.0),
            &AudioSafetyStage::new(48000.0),
        ];
        let names: Vec<_> = stages.iter().map(|s| s.name()).collect();
        assert_eq!(names, ["Noise Reduction", "10-Band Equalizer", "Effects", "Audio Safety"]);
    }
}
