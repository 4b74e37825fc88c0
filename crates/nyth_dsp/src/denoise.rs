//! Spectral Denoiser
//!
//! Short-time Fourier transform noise suppressor used by the "rnnoise" mode
//! of the noise reduction stage.
//!
//! # Algorithm
//!
//! - 512-point frames, hop 256 (50% overlap), sqrt-Hann analysis and
//!   synthesis windows (their product sums to one, so unity gain
//!   reconstructs the input exactly, delayed by [`DENOISER_LATENCY`])
//! - Per-bin noise floor: smoothed power with minimum tracking; the estimate
//!   follows drops immediately and rises slowly
//! - Wiener-style gain: `max(floor, 1 - aggressiveness * β * N / P)`,
//!   smoothed across frames to limit musical noise
//!
//! All buffers, including the FFT scratch, are allocated in `new()`.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::error::DspError;
use crate::processor::MAX_CHANNELS;
use crate::util::smooth;

pub const FRAME_SIZE: usize = 512;
pub const HOP_SIZE: usize = FRAME_SIZE / 2;
const NUM_BINS: usize = FRAME_SIZE / 2 + 1;

/// Samples between input and the matching output sample
pub const DENOISER_LATENCY: usize = FRAME_SIZE;

/// Over-subtraction applied at aggressiveness 1.0
const OVERSUBTRACTION: f32 = 3.0;
/// Lowest per-bin gain (-20dB)
const GAIN_FLOOR: f32 = 0.1;
/// Per-frame smoothing of the power spectrum and of the gains
const POWER_SMOOTHING: f32 = 0.7;
const GAIN_SMOOTHING: f32 = 0.5;
/// Frames averaged to seed the noise estimate
const INIT_FRAMES: u32 = 8;
/// Per-frame growth of the noise estimate while the signal sits above it
const NOISE_RISE: f32 = 1.002;
const MIN_POWER: f32 = 1e-12;

/// Streaming state of one channel
struct ChannelState {
    /// Most recent analysis frame, oldest sample first
    input: Vec<f32>,
    /// Overlap-add accumulator
    overlap: Vec<f32>,
    /// Finished samples handed out during the next hop
    output: Vec<f32>,
    power: Vec<f32>,
    noise: Vec<f32>,
    gains: Vec<f32>,
    fill: usize,
    frames: u32,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            input: vec![0.0; FRAME_SIZE],
            overlap: vec![0.0; FRAME_SIZE],
            output: vec![0.0; HOP_SIZE],
            power: vec![0.0; NUM_BINS],
            noise: vec![0.0; NUM_BINS],
            gains: vec![1.0; NUM_BINS],
            fill: 0,
            frames: 0,
        }
    }

    fn reset(&mut self) {
        self.input.fill(0.0);
        self.overlap.fill(0.0);
        self.output.fill(0.0);
        self.power.fill(0.0);
        self.noise.fill(0.0);
        self.gains.fill(1.0);
        self.fill = 0;
        self.frames = 0;
    }
}

/// STFT noise suppressor for up to two interleaved channels
pub struct SpectralDenoiser {
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    fft_scratch: Vec<Complex<f32>>,
    channels: [ChannelState; MAX_CHANNELS],
    aggressiveness: f32,
}

impl SpectralDenoiser {
    pub fn new(sample_rate: f32) -> Result<Self, DspError> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(FRAME_SIZE);
        let inverse = planner.plan_fft_inverse(FRAME_SIZE);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        // Periodic Hann, square-rooted: w[n]^2 + w[n + hop]^2 == 1
        let window = (0..FRAME_SIZE)
            .map(|n| {
                let hann = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / FRAME_SIZE as f32).cos());
                hann.sqrt()
            })
            .collect();

        Ok(Self {
            forward,
            inverse,
            window,
            spectrum: vec![Complex::new(0.0, 0.0); FRAME_SIZE],
            fft_scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            channels: core::array::from_fn(|_| ChannelState::new()),
            aggressiveness: 1.0,
        })
    }

    /// Suppression strength, clamped to [0, 3]; 0 leaves the signal untouched
    pub fn set_aggressiveness(&mut self, aggressiveness: f32) {
        self.aggressiveness = if aggressiveness.is_finite() {
            aggressiveness.clamp(0.0, 3.0)
        } else {
            1.0
        };
    }

    pub fn aggressiveness(&self) -> f32 {
        self.aggressiveness
    }

    /// # Real-time Safety
    /// No allocations; one FFT pair per channel every [`HOP_SIZE`] frames.
    pub fn process_interleaved(&mut self, buffer: &mut [f32], channels: usize) {
        let channels = channels.clamp(1, MAX_CHANNELS);
        for frame in buffer.chunks_exact_mut(channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = self.process_sample(ch, *sample);
            }
        }
    }

    #[inline]
    fn process_sample(&mut self, channel: usize, sample: f32) -> f32 {
        let state = &mut self.channels[channel];
        let out = state.output[state.fill];
        state.input[FRAME_SIZE - HOP_SIZE + state.fill] = sample;
        state.fill += 1;
        if state.fill == HOP_SIZE {
            state.fill = 0;
            self.process_frame(channel);
        }
        out
    }

    fn process_frame(&mut self, channel: usize) {
        let state = &mut self.channels[channel];

        for ((bin, &x), &w) in self.spectrum.iter_mut().zip(&state.input).zip(&self.window) {
            *bin = Complex::new(x * w, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);

        let beta = self.aggressiveness * OVERSUBTRACTION;
        let seeding = state.frames < INIT_FRAMES;
        for k in 0..NUM_BINS {
            let power = self.spectrum[k].norm_sqr();
            let smoothed = if state.frames == 0 {
                power
            } else {
                smooth(state.power[k], power, POWER_SMOOTHING)
            };
            state.power[k] = smoothed;

            state.noise[k] = if seeding {
                // Running mean over the first frames
                let n = state.frames as f32;
                (state.noise[k] * n + smoothed) / (n + 1.0)
            } else if smoothed < state.noise[k] {
                smoothed
            } else {
                (state.noise[k] * NOISE_RISE).min(smoothed)
            };

            let target = (1.0 - beta * state.noise[k] / power.max(MIN_POWER)).max(GAIN_FLOOR);
            let target = if beta > 0.0 { target } else { 1.0 };
            state.gains[k] = smooth(state.gains[k], target, GAIN_SMOOTHING).min(1.0);
        }
        state.frames = state.frames.saturating_add(1);

        // Mirror the gains onto the negative frequencies
        for k in 0..NUM_BINS {
            self.spectrum[k] *= state.gains[k];
        }
        for k in NUM_BINS..FRAME_SIZE {
            self.spectrum[k] *= state.gains[FRAME_SIZE - k];
        }

        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.fft_scratch);

        let norm = 1.0 / FRAME_SIZE as f32;
        for ((acc, bin), &w) in state.overlap.iter_mut().zip(&self.spectrum).zip(&self.window) {
            *acc += bin.re * w * norm;
        }

        state.output.copy_from_slice(&state.overlap[..HOP_SIZE]);
        state.overlap.copy_within(HOP_SIZE.., 0);
        state.overlap[FRAME_SIZE - HOP_SIZE..].fill(0.0);
        state.input.copy_within(HOP_SIZE.., 0);
    }

    pub fn reset(&mut self) {
        for state in &mut self.channels {
            state.reset();
        }
    }
}
