//! Audio Graph
//!
//! Owns every stage and runs them in a fixed order on the audio thread:
//!
//! ```text
//! input ─▶ NoiseReduction ─▶ Equalizer ─▶ Effects ─▶ Safety ─▶ output
//!                                                              │
//!                                                    SpectrumTap (rtrb)
//! ```
//!
//! At the start of every buffer the graph picks up the newest parameter
//! snapshots. Long host buffers are split into blocks of at most
//! `buffer_size` frames so stage scratch memory can be sized up front; the
//! per-block safety reports are merged into one report per buffer, which is
//! also folded into the running [`SafetyStatistics`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nyth_dsp::{
    AudioProcessor, AudioSafetyReport, AudioSafetyStage, EffectsStage, Equalizer,
    NoiseReductionStage, ProcessContext, SafetyStatistics, SpectralDenoiser,
};

use crate::analysis::SpectrumTap;
use crate::params::{ParameterReader, Publisher};

/// Where the graph is in its stop sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    /// Faded out and flushed; output is silence from here on
    Stopped,
}

pub struct AudioGraph {
    context: ProcessContext,
    noise: NoiseReductionStage,
    equalizer: Equalizer,
    effects: EffectsStage,
    safety: AudioSafetyStage,
    params: ParameterReader,
    reports: Publisher<AudioSafetyReport>,
    statistics: SafetyStatistics,
    statistics_tx: Publisher<SafetyStatistics>,
    tap: Option<SpectrumTap>,
    stop_requested: Arc<AtomicBool>,
    state: RunState,
}

impl AudioGraph {
    /// # Arguments
    /// * `context` - Sample rate, channel count and maximum block size
    /// * `denoiser` - Spectral denoiser, `None` when it could not be loaded
    pub fn new(
        context: ProcessContext,
        denoiser: Option<SpectralDenoiser>,
        params: ParameterReader,
        reports: Publisher<AudioSafetyReport>,
        statistics_tx: Publisher<SafetyStatistics>,
        stop_requested: Arc<AtomicBool>,
    ) -> Self {
        let sample_rate = context.sample_rate;
        let block_samples = context.buffer_size * context.channels;

        let mut graph = Self {
            context,
            noise: NoiseReductionStage::new(sample_rate, block_samples, denoiser),
            equalizer: Equalizer::new(sample_rate),
            effects: EffectsStage::new(sample_rate),
            safety: AudioSafetyStage::new(sample_rate),
            params,
            reports,
            statistics: SafetyStatistics::default(),
            statistics_tx,
            tap: None,
            stop_requested,
            state: RunState::Running,
        };
        graph.refresh();
        graph
    }

    /// Attach the spectrum tap fed with the graph output
    pub fn set_tap(&mut self, tap: SpectrumTap) {
        self.tap = Some(tap);
    }

    pub fn context(&self) -> &ProcessContext {
        &self.context
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Apply whatever snapshots were published since the last buffer
    fn refresh(&mut self) {
        if let Some(state) = self.params.equalizer.poll() {
            self.equalizer.apply_state(&state);
        }
        if let Some(config) = self.params.noise_reduction.poll() {
            self.noise.set_config(&config);
        }
        if let Some(config) = self.params.compressor.poll() {
            self.effects.set_compressor_config(&config);
        }
        if let Some(config) = self.params.delay.poll() {
            self.effects.set_delay_config(&config);
        }
        if let Some(config) = self.params.safety.poll() {
            self.safety.set_config(&config);
        }
    }

    /// Process one interleaved host buffer in place
    ///
    /// # Real-time Safety
    /// No locks, no allocations, no blocking. Trailing samples that do not
    /// form a whole frame are zeroed and skip the stages.
    pub fn process(&mut self, buffer: &mut [f32]) {
        if self.state == RunState::Stopped {
            buffer.fill(0.0);
            self.tap_output(buffer);
            return;
        }

        self.refresh();
        let fade_out = self.stop_requested.load(Ordering::Acquire);

        let channels = self.context.channels;
        let whole = self.context.frames(buffer) * channels;
        buffer[whole..].fill(0.0);
        let buffer = &mut buffer[..whole];

        let block_len = (self.context.buffer_size * channels).max(channels);
        let mut report = AudioSafetyReport::default();
        let mut measured = 0;

        for block in buffer.chunks_mut(block_len) {
            self.noise.process(block, &self.context);
            self.equalizer.process(block, &self.context);
            self.effects.process(block, &self.context);
            self.safety.process(block, &self.context);

            if measured == 0 {
                report = *self.safety.report();
            } else {
                report.merge(measured, self.safety.report(), block.len());
            }
            measured += block.len();
        }

        if fade_out {
            fade_to_silence(buffer, channels);
            self.reset();
            self.state = RunState::Stopped;
        }

        if self.safety.is_enabled() && measured > 0 {
            self.statistics.record(&report);
            self.statistics_tx.publish(self.statistics);
        }
        self.reports.publish(report);
        self.tap_output(buffer);
    }

    fn tap_output(&mut self, buffer: &[f32]) {
        if let Some(tap) = self.tap.as_mut() {
            tap.push_interleaved(buffer, self.context.channels);
        }
    }

    /// Flush filter, envelope and delay state of every stage
    pub fn reset(&mut self) {
        self.noise.reset();
        self.equalizer.reset();
        self.effects.reset();
        self.safety.reset();
    }
}

/// Linear ramp from unity down to zero across the whole buffer
fn fade_to_silence(buffer: &mut [f32], channels: usize) {
    let frames = buffer.len() / channels;
    if frames == 0 {
        buffer.fill(0.0);
        return;
    }
    for (i, frame) in buffer.chunks_mut(channels).enumerate() {
        let gain = 1.0 - (i + 1) as f32 / frames as f32;
        for sample in frame.iter_mut() {
            *sample *= gain.max(0.0);
        }
    }
}
