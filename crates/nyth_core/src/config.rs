//! Engine Configuration

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Configuration fixed for the lifetime of an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Sample rate in Hz (e.g., 44100, 48000, 96000)
    pub sample_rate: u32,

    /// Maximum frames per processing block; larger host buffers are split
    pub buffer_size: u32,

    /// Number of interleaved channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Audio time between spectrum frames
    pub spectrum_interval_ms: u32,

    /// Load the spectral denoiser used by the "rnnoise" noise mode
    pub load_spectral_denoiser: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 512,
            channels: 2,
            spectrum_interval_ms: nyth_dsp::DEFAULT_INTERVAL_MS,
            load_spectral_denoiser: true,
        }
    }
}

impl EngineConfig {
    /// Config with the given rate and block size, other fields default
    pub fn new(sample_rate: u32, buffer_size: u32) -> Self {
        Self {
            sample_rate,
            buffer_size,
            ..Default::default()
        }
    }

    /// Create config optimized for low latency
    pub fn low_latency() -> Self {
        Self {
            buffer_size: 128, // ~2.6ms at 48kHz
            ..Default::default()
        }
    }

    /// Create config optimized for stability
    pub fn stable() -> Self {
        Self {
            buffer_size: 1024, // ~21ms at 48kHz
            ..Default::default()
        }
    }

    /// Duration of one block in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }

    /// Interleaved samples in one full block
    pub fn block_samples(&self) -> usize {
        self.buffer_size as usize * self.channels as usize
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        if !(8000..=192_000).contains(&self.sample_rate) {
            return Err(EngineError::InvalidConfig(format!(
                "Invalid sample rate: {}",
                self.sample_rate
            )));
        }
        if self.channels == 0 || self.channels as usize > nyth_dsp::MAX_CHANNELS {
            return Err(EngineError::InvalidConfig(format!(
                "Invalid channel count: {}",
                self.channels
            )));
        }
        if !(16..=8192).contains(&self.buffer_size) {
            return Err(EngineError::InvalidConfig(format!(
                "Invalid buffer size: {}",
                self.buffer_size
            )));
        }
        if self.spectrum_interval_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "Spectrum interval must be positive".into(),
            ));
        }
        Ok(())
    }
}
