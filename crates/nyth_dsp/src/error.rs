//! DSP Error Types

use thiserror::Error;

/// Errors that can occur during DSP operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Invalid band index: {0} (must be 0-9)")]
    InvalidBandIndex(usize),

    #[error("Invalid preset length: {0} (must be 10 gains)")]
    InvalidPresetLength(usize),

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("Invalid filter coefficients for frequency {frequency}Hz at sample rate {sample_rate}Hz")]
    InvalidCoefficients { frequency: f32, sample_rate: f32 },

    #[error("Sample rate must be positive, got {0}")]
    InvalidSampleRate(f32),

    #[error("Unsupported channel count: {0} (must be 1 or 2)")]
    InvalidChannelCount(usize),

    #[error("Spectral denoiser unavailable: {0}")]
    DenoiserUnavailable(String),
}
