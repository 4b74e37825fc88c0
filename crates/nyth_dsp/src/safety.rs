//! Audio Safety Stage
//!
//! Last stage of the chain. Measures the incoming block, removes DC offset,
//! bounds the output with the soft-knee limiter and watches for acoustic
//! feedback (howling). Detection only reports; it never mutes audio.
//!
//! ```text
//! analyse/sanitize ──▶ DC removal ──▶ limiter ──▶ feedback detector (read-only)
//! ```

use serde::{Deserialize, Serialize};

use crate::limiter::Limiter;
use crate::processor::{AudioProcessor, ProcessContext, MAX_CHANNELS};
use crate::util::{finite_or, sanitize};

/// Pole of the DC blocking high-pass (~38Hz corner at 48kHz)
const DC_ALPHA: f32 = 0.995;

/// Feedback analysis window and lag range
const FEEDBACK_WINDOW: usize = 1024;
const FEEDBACK_MIN_LAG: usize = 32;
const FEEDBACK_MAX_LAG: usize = 512;
/// New samples required before the autocorrelation is recomputed
const FEEDBACK_HOP: usize = 512;
/// Below this window energy the score is forced to zero
const MIN_ENERGY: f32 = 1e-9;

/// Sample magnitude above which a sample counts as clipped
const CLIP_LEVEL: f32 = 1.0;

/// Safety stage configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSafetyConfig {
    pub enabled: bool,
    pub dc_removal_enabled: bool,
    /// Linear offset below which DC removal stays idle
    pub dc_threshold: f32,
    pub limiter_enabled: bool,
    pub limiter_threshold_db: f32,
    pub soft_knee_limiter: bool,
    pub knee_width_db: f32,
    pub feedback_detect_enabled: bool,
    /// Normalized autocorrelation above which feedback is flagged
    pub feedback_corr_threshold: f32,
}

impl Default for AudioSafetyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dc_removal_enabled: true,
            dc_threshold: 0.002,
            limiter_enabled: true,
            limiter_threshold_db: -1.0,
            soft_knee_limiter: true,
            knee_width_db: 6.0,
            feedback_detect_enabled: true,
            feedback_corr_threshold: 0.95,
        }
    }
}

impl AudioSafetyConfig {
    /// Clamp every field into its supported range
    pub fn sanitized(mut self) -> Self {
        self.dc_threshold = finite_or(self.dc_threshold, 0.002).clamp(0.0, 0.05);
        self.limiter_threshold_db = finite_or(self.limiter_threshold_db, -1.0).clamp(-20.0, 0.0);
        self.knee_width_db = finite_or(self.knee_width_db, 6.0).clamp(0.0, 24.0);
        self.feedback_corr_threshold = finite_or(self.feedback_corr_threshold, 0.95).clamp(0.0, 1.0);
        self
    }
}

/// Per-buffer measurements published to the UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSafetyReport {
    /// Input peak (linear)
    pub peak: f32,
    pub rms: f32,
    /// Mean of the input block
    pub dc_offset: f32,
    /// Input samples with |x| > 1.0
    pub clipped_samples: u32,
    pub feedback_score: f32,
    /// Input peak exceeded the limiter ceiling
    pub overload: bool,
    /// Non-finite samples were replaced with silence
    pub has_nan: bool,
    pub feedback_likely: bool,
}

impl AudioSafetyReport {
    /// Fold the report of a following block into this one
    ///
    /// `samples` and `other_samples` are the block lengths the reports were
    /// measured over, used to weight rms and dc offset.
    pub fn merge(&mut self, samples: usize, other: &AudioSafetyReport, other_samples: usize) {
        let total = samples + other_samples;
        if total == 0 {
            return;
        }
        let (w_self, w_other) = (
            samples as f32 / total as f32,
            other_samples as f32 / total as f32,
        );

        self.rms = (self.rms * self.rms * w_self + other.rms * other.rms * w_other).sqrt();
        self.dc_offset = self.dc_offset * w_self + other.dc_offset * w_other;
        self.peak = self.peak.max(other.peak);
        self.clipped_samples = self.clipped_samples.saturating_add(other.clipped_samples);
        self.feedback_score = self.feedback_score.max(other.feedback_score);
        self.overload |= other.overload;
        self.has_nan |= other.has_nan;
        self.feedback_likely |= other.feedback_likely;
    }
}

/// Levels of one report, as tracked by [`SafetyStatistics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyLevels {
    pub peak: f32,
    pub rms: f32,
    pub dc_offset: f32,
    pub clipped_samples: f32,
    pub feedback_score: f32,
}

impl SafetyLevels {
    fn from_report(report: &AudioSafetyReport) -> Self {
        Self {
            peak: report.peak,
            rms: report.rms,
            dc_offset: report.dc_offset,
            clipped_samples: report.clipped_samples as f32,
            feedback_score: report.feedback_score,
        }
    }

    fn combine(&self, other: &Self, f: impl Fn(f32, f32) -> f32) -> Self {
        Self {
            peak: f(self.peak, other.peak),
            rms: f(self.rms, other.rms),
            dc_offset: f(self.dc_offset, other.dc_offset),
            clipped_samples: f(self.clipped_samples, other.clipped_samples),
            feedback_score: f(self.feedback_score, other.feedback_score),
        }
    }
}

/// Running totals over every report since the engine started
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SafetyStatistics {
    pub min: SafetyLevels,
    pub max: SafetyLevels,
    /// Running mean per buffer
    pub avg: SafetyLevels,
    pub total_buffers: u64,
    pub total_clipped_samples: u64,
    pub total_overload_buffers: u64,
    pub total_feedback_buffers: u64,
    pub total_nan_buffers: u64,
}

impl SafetyStatistics {
    /// Fold one per-buffer report into the totals
    pub fn record(&mut self, report: &AudioSafetyReport) {
        let levels = SafetyLevels::from_report(report);
        if self.total_buffers == 0 {
            self.min = levels;
            self.max = levels;
            self.avg = levels;
        } else {
            let factor = 1.0 / (self.total_buffers + 1) as f32;
            self.min = self.min.combine(&levels, f32::min);
            self.max = self.max.combine(&levels, f32::max);
            self.avg = self.avg.combine(&levels, |avg, x| avg + (x - avg) * factor);
        }

        self.total_buffers += 1;
        self.total_clipped_samples += u64::from(report.clipped_samples);
        self.total_overload_buffers += u64::from(report.overload);
        self.total_feedback_buffers += u64::from(report.feedback_likely);
        self.total_nan_buffers += u64::from(report.has_nan);
    }
}

/// Leaky-integrator DC blocker: `y[n] = x[n] - x[n-1] + a*y[n-1]`
///
/// The filter always runs so its state stays warm; `mix` ramps between the
/// dry and filtered signal when removal engages or disengages.
#[derive(Debug, Clone, Copy, Default)]
struct DcBlocker {
    x1: f32,
    y1: f32,
    mix: f32,
}

impl DcBlocker {
    #[inline]
    fn run(&mut self, x: f32) -> f32 {
        let y = x - self.x1 + DC_ALPHA * self.y1;
        self.x1 = x;
        self.y1 = y;
        y
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Normalized autocorrelation detector for sustained periodic tones
pub struct FeedbackDetector {
    history: Vec<f32>,
    write_pos: usize,
    filled: usize,
    since_update: usize,
    /// Linearised window (oldest first)
    window: Vec<f32>,
    /// Prefix sums of squares over `window`
    energy: Vec<f32>,
    score: f32,
}

impl FeedbackDetector {
    pub fn new() -> Self {
        Self {
            history: vec![0.0; FEEDBACK_WINDOW],
            write_pos: 0,
            filled: 0,
            since_update: 0,
            window: vec![0.0; FEEDBACK_WINDOW],
            energy: vec![0.0; FEEDBACK_WINDOW + 1],
            score: 0.0,
        }
    }

    /// Feed one mono sample
    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.history[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % FEEDBACK_WINDOW;
        self.filled = (self.filled + 1).min(FEEDBACK_WINDOW);
        self.since_update += 1;
    }

    /// Recompute the score if enough new audio arrived, and return it
    pub fn update(&mut self) -> f32 {
        if self.since_update < FEEDBACK_HOP || self.filled < FEEDBACK_WINDOW {
            return self.score;
        }
        self.since_update = 0;

        for i in 0..FEEDBACK_WINDOW {
            self.window[i] = self.history[(self.write_pos + i) % FEEDBACK_WINDOW];
        }
        self.energy[0] = 0.0;
        for i in 0..FEEDBACK_WINDOW {
            self.energy[i + 1] = self.energy[i] + self.window[i] * self.window[i];
        }

        let total = self.energy[FEEDBACK_WINDOW];
        if total < MIN_ENERGY {
            self.score = 0.0;
            return self.score;
        }

        let mut best = 0.0_f32;
        for lag in FEEDBACK_MIN_LAG..=FEEDBACK_MAX_LAG {
            let n = FEEDBACK_WINDOW - lag;
            let head = self.energy[n];
            let tail = self.energy[FEEDBACK_WINDOW] - self.energy[lag];
            let denom = (head * tail).sqrt();
            if denom < MIN_ENERGY {
                continue;
            }
            let num: f32 = self.window[..n]
                .iter()
                .zip(&self.window[lag..])
                .map(|(a, b)| a * b)
                .sum();
            best = best.max(num / denom);
        }

        self.score = best.clamp(0.0, 1.0);
        self.score
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.write_pos = 0;
        self.filled = 0;
        self.since_update = 0;
        self.score = 0.0;
    }
}

impl Default for FeedbackDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// DC removal, limiting and feedback detection with a per-buffer report
pub struct AudioSafetyStage {
    config: AudioSafetyConfig,
    dc: [DcBlocker; MAX_CHANNELS],
    limiter: Limiter,
    feedback: FeedbackDetector,
    report: AudioSafetyReport,
}

impl AudioSafetyStage {
    pub fn new(sample_rate: f32) -> Self {
        let config = AudioSafetyConfig::default();
        Self {
            config,
            dc: [DcBlocker::default(); MAX_CHANNELS],
            limiter: Limiter::new(
                config.limiter_threshold_db,
                config.knee_width_db,
                config.soft_knee_limiter,
                sample_rate,
            ),
            feedback: FeedbackDetector::new(),
            report: AudioSafetyReport::default(),
        }
    }

    /// Apply a published configuration snapshot
    pub fn set_config(&mut self, config: &AudioSafetyConfig) {
        let config = config.sanitized();
        if config == self.config {
            return;
        }
        self.limiter.set_params(
            config.limiter_threshold_db,
            config.knee_width_db,
            config.soft_knee_limiter,
        );
        if config.feedback_detect_enabled != self.config.feedback_detect_enabled {
            self.feedback.reset();
        }
        self.config = config;
    }

    pub fn config(&self) -> &AudioSafetyConfig {
        &self.config
    }

    /// Report for the most recently processed block
    pub fn report(&self) -> &AudioSafetyReport {
        &self.report
    }

    /// Measure the input and scrub non-finite samples
    fn analyse(&mut self, buffer: &mut [f32], channels: usize) -> [f32; MAX_CHANNELS] {
        let mut report = AudioSafetyReport::default();
        let mut sums = [0.0_f32; MAX_CHANNELS];
        let mut sum_sq = 0.0_f32;

        for frame in buffer.chunks_exact_mut(channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                report.has_nan |= !sample.is_finite();
                *sample = sanitize(*sample);
                let x = *sample;
                let magnitude = x.abs();
                sums[ch] += x;
                sum_sq += x * x;
                report.peak = report.peak.max(magnitude);
                if magnitude > CLIP_LEVEL {
                    report.clipped_samples += 1;
                }
            }
        }

        let frames = (buffer.len() / channels).max(1) as f32;
        let mut means = [0.0_f32; MAX_CHANNELS];
        for ch in 0..channels {
            means[ch] = sums[ch] / frames;
        }
        report.dc_offset = means[..channels].iter().sum::<f32>() / channels as f32;
        report.rms = (sum_sq / (frames * channels as f32)).sqrt();

        self.report = report;
        means
    }

    fn remove_dc(&mut self, buffer: &mut [f32], channels: usize, means: &[f32; MAX_CHANNELS]) {
        let frames = buffer.len() / channels;
        if frames == 0 {
            return;
        }
        for ch in 0..channels {
            let active = self.config.dc_removal_enabled && means[ch].abs() >= self.config.dc_threshold;
            let blocker = &mut self.dc[ch];
            let start = blocker.mix;
            let target = if active { 1.0 } else { 0.0 };
            let step = (target - start) / frames as f32;

            for (i, frame) in buffer.chunks_exact_mut(channels).enumerate() {
                let x = frame[ch];
                let filtered = blocker.run(x);
                let mix = start + step * (i + 1) as f32;
                frame[ch] = x + (filtered - x) * mix;
            }
            blocker.mix = target;
        }
    }

    fn detect_feedback(&mut self, buffer: &[f32], channels: usize) {
        for frame in buffer.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            self.feedback.push(mono);
        }
        let score = self.feedback.update();
        self.report.feedback_score = score;
        self.report.feedback_likely = score > self.config.feedback_corr_threshold;
    }
}

impl AudioProcessor for AudioSafetyStage {
    /// # Real-time Safety
    /// No allocations; the feedback window is preallocated.
    fn process(&mut self, buffer: &mut [f32], context: &ProcessContext) {
        if !self.config.enabled {
            self.report = AudioSafetyReport::default();
            return;
        }
        let channels = context.channels.clamp(1, MAX_CHANNELS);

        let means = self.analyse(buffer, channels);
        self.remove_dc(buffer, channels, &means);

        let ceiling = if self.config.limiter_enabled {
            self.limiter.process_interleaved(buffer, channels);
            self.limiter.ceiling()
        } else {
            CLIP_LEVEL
        };

        if self.config.feedback_detect_enabled {
            self.detect_feedback(buffer, channels);
        }

        self.report.overload = self.report.peak > ceiling;
    }

    fn reset(&mut self) {
        for blocker in &mut self.dc {
            blocker.reset();
        }
        self.limiter.reset();
        self.feedback.reset();
        self.report = AudioSafetyReport::default();
    }

    fn name(&self) -> &'static str {
        "Audio Safety"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}
