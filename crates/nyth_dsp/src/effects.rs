//! Effects Stage
//!
//! Optional dynamics and time-based processing between the equalizer and the
//! safety stage: compressor first, then delay. Each effect has its own
//! `enabled` switch and both default off.

use crate::compressor::{Compressor, CompressorConfig};
use crate::delay::{DelayConfig, DelayLine};
use crate::processor::{AudioProcessor, ProcessContext};

pub struct EffectsStage {
    compressor: Compressor,
    delay: DelayLine,
}

impl EffectsStage {
    /// The delay line is allocated here for its maximum length
    pub fn new(sample_rate: f32) -> Self {
        Self {
            compressor: Compressor::new(sample_rate),
            delay: DelayLine::new(sample_rate),
        }
    }

    pub fn set_compressor_config(&mut self, config: &CompressorConfig) {
        self.compressor.set_config(config);
    }

    pub fn set_delay_config(&mut self, config: &DelayConfig) {
        self.delay.set_config(config);
    }

    pub fn compressor(&self) -> &Compressor {
        &self.compressor
    }

    pub fn delay(&self) -> &DelayLine {
        &self.delay
    }
}

impl AudioProcessor for EffectsStage {
    fn process(&mut self, buffer: &mut [f32], context: &ProcessContext) {
        self.compressor.process_interleaved(buffer, context.channels);
        self.delay.process_interleaved(buffer, context.channels);
    }

    fn reset(&mut self) {
        self.compressor.reset();
        self.delay.reset();
    }

    fn name(&self) -> &'static str {
        "Effects"
    }

    fn is_enabled(&self) -> bool {
        self.compressor.config().enabled || self.delay.config().enabled
    }
}
