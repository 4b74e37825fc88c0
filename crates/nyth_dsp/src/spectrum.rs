//! FFT Spectrum Analyzer
//!
//! Turns a mono sample stream into periodic [`SpectrumFrame`]s for
//! visualization. The analyzer itself is single-threaded and owns all of its
//! buffers; the engine runs it on a dedicated analysis thread fed from the
//! audio thread through a ring buffer.
//!
//! # Frame layout
//!
//! - 2048-point FFT with a Hann window (~23Hz resolution at 48kHz)
//! - 32 logarithmically spaced output bins, DC excluded
//! - Each bin mapped from [-60, 0] dB to [0, 1]

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

/// FFT size (must be power of 2)
pub const FFT_SIZE: usize = 2048;

/// Number of output bins
pub const NUM_BINS: usize = 32;

/// Default time between frames
pub const DEFAULT_INTERVAL_MS: u32 = 50;

/// Level mapped to 0.0
const FLOOR_DB: f32 = -60.0;

/// A single published spectrum snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    /// Normalized magnitude per log-spaced bin, each in [0, 1]
    pub magnitudes: [f32; NUM_BINS],
    /// Position of the frame in the analysed stream
    pub timestamp_ms: i64,
}

impl Default for SpectrumFrame {
    fn default() -> Self {
        Self {
            magnitudes: [0.0; NUM_BINS],
            timestamp_ms: 0,
        }
    }
}

impl SpectrumFrame {
    /// Index of the loudest bin
    pub fn peak_bin(&self) -> usize {
        self.magnitudes
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, &m)| if m > best.1 { (i, m) } else { best })
            .0
    }
}

/// Hann window value
fn hann_window(n: usize, size: usize) -> f32 {
    0.5 * (1.0 - (2.0 * std::f32::consts::PI * n as f32 / (size - 1) as f32).cos())
}

/// Range of FFT bins `[start, end)` averaged into each output bin
fn log_bin_ranges() -> [(usize, usize); NUM_BINS] {
    let nyquist = FFT_SIZE / 2;
    let log_min = 1.0_f32.ln(); // skip DC
    let log_max = (nyquist as f32).ln();
    let log_step = (log_max - log_min) / NUM_BINS as f32;

    core::array::from_fn(|i| {
        let start = (log_min + i as f32 * log_step).exp() as usize;
        let end = ((log_min + (i + 1) as f32 * log_step).exp() as usize).min(nyquist);
        // Low bins are narrower than one FFT bin; always take at least one
        (start.max(1), (end + 1).min(nyquist).max(start + 1))
    })
}

/// Streaming spectrum analyzer
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// Last `FFT_SIZE` samples, ring-indexed by `write_pos`
    history: Vec<f32>,
    write_pos: usize,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    ranges: [(usize, usize); NUM_BINS],
    sample_rate: f32,
    interval_samples: u64,
    since_frame: u64,
    analysed: u64,
}

impl SpectrumAnalyzer {
    /// # Arguments
    /// * `sample_rate` - Audio sample rate in Hz
    /// * `interval_ms` - Audio time between frames
    pub fn new(sample_rate: f32, interval_ms: u32) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let scratch_len = fft.get_inplace_scratch_len();
        let interval_samples = ((sample_rate * interval_ms.max(1) as f32 / 1000.0).round() as u64).max(1);

        Self {
            fft,
            window: (0..FFT_SIZE).map(|i| hann_window(i, FFT_SIZE)).collect(),
            history: vec![0.0; FFT_SIZE],
            write_pos: 0,
            buffer: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            ranges: log_bin_ranges(),
            sample_rate,
            interval_samples,
            since_frame: 0,
            analysed: 0,
        }
    }

    /// Samples between two frames
    pub fn interval_samples(&self) -> u64 {
        self.interval_samples
    }

    /// Total number of samples consumed so far
    pub fn analysed_samples(&self) -> u64 {
        self.analysed
    }

    /// Feed mono samples; returns the newest frame completed by this slice
    pub fn push_samples(&mut self, samples: &[f32]) -> Option<SpectrumFrame> {
        let mut latest = None;
        for &sample in samples {
            self.history[self.write_pos] = if sample.is_finite() { sample } else { 0.0 };
            self.write_pos = (self.write_pos + 1) % FFT_SIZE;
            self.analysed += 1;
            self.since_frame += 1;

            if self.since_frame >= self.interval_samples {
                self.since_frame = 0;
                latest = Some(self.compute_frame());
            }
        }
        latest
    }

    fn compute_frame(&mut self) -> SpectrumFrame {
        // Oldest sample first
        for (i, bin) in self.buffer.iter_mut().enumerate() {
            let sample = self.history[(self.write_pos + i) % FFT_SIZE];
            *bin = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        // A full-scale sine through the Hann window peaks near FFT_SIZE / 4
        let reference_magnitude = FFT_SIZE as f32 / 4.0;
        let mut magnitudes = [0.0; NUM_BINS];
        for (magnitude, &(start, end)) in magnitudes.iter_mut().zip(&self.ranges) {
            let bins = &self.buffer[start..end];
            let avg = bins.iter().map(|c| c.norm()).sum::<f32>() / bins.len() as f32;
            let db = 20.0 * (avg / reference_magnitude).max(1e-10).log10();
            *magnitude = ((db - FLOOR_DB) / -FLOOR_DB).clamp(0.0, 1.0);
        }

        SpectrumFrame {
            magnitudes,
            timestamp_ms: (self.analysed as f64 * 1000.0 / self.sample_rate as f64) as i64,
        }
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.write_pos = 0;
        self.since_frame = 0;
        self.analysed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SR).sin() * amplitude)
            .collect()
    }

    #[test]
    fn test_silence_gives_zero_frame() {
        let mut analyzer = SpectrumAnalyzer::new(SR, 50);
        let frame = analyzer.push_samples(&[0.0; 4800]).unwrap();
        assert!(frame.magnitudes.iter().all(|&m| m == 0.0));
        assert_eq!(frame.timestamp_ms, 100);
    }

    #[test]
    fn test_frame_every_interval() {
        let mut analyzer = SpectrumAnalyzer::new(SR, 50);
        assert_eq!(analyzer.interval_samples(), 2400);
        assert!(analyzer.push_samples(&[0.0; 2399]).is_none());
        let frame = analyzer.push_samples(&[0.0; 1]).unwrap();
        assert_eq!(frame.timestamp_ms, 50);
    }

    #[test]
    fn test_sine_peak_lands_in_matching_bin() {
        let mut analyzer = SpectrumAnalyzer::new(SR, 50);
        let frame = analyzer.push_samples(&sine(1000.0, 0.5, 4800)).unwrap();

        // 1kHz is FFT bin ~42.7, i.e. log bin 17
        let peak = frame.peak_bin();
        assert!((16..=18).contains(&peak), "peak bin {}", peak);
        assert!(frame.magnitudes[peak] > 0.5);
        assert!(frame.magnitudes.iter().all(|&m| (0.0..=1.0).contains(&m)));
    }

    #[test]
    fn test_deterministic_frames() {
        let input = sine(440.0, 0.3, 9600);
        let mut a = SpectrumAnalyzer::new(SR, 50);
        let mut b = SpectrumAnalyzer::new(SR, 50);
        assert_eq!(a.push_samples(&input), b.push_samples(&input));
    }

    #[test]
    fn test_stationary_input_is_stable() {
        let mut analyzer = SpectrumAnalyzer::new(SR, 50);
        let input = sine(1000.0, 0.5, 48000);
        let mut frames = Vec::new();
        for chunk in input.chunks(2400) {
            frames.extend(analyzer.push_samples(chunk));
        }
        let last = frames[frames.len() - 1];
        let previous = frames[frames.len() - 2];
        for (a, b) in last.magnitudes.iter().zip(&previous.magnitudes) {
            assert!((a - b).abs() < 0.05);
        }
    }

    #[test]
    fn test_non_finite_input_is_ignored() {
        let mut analyzer = SpectrumAnalyzer::new(SR, 50);
        let mut input = vec![0.0; 2400];
        input[10] = f32::NAN;
        input[20] = f32::INFINITY;
        let frame = analyzer.push_samples(&input).unwrap();
        assert!(frame.magnitudes.iter().all(|m| m.is_finite()));
    }

    #[test]
    fn test_bin_ranges_cover_spectrum() {
        let ranges = log_bin_ranges();
        for &(start, end) in &ranges {
            assert!(start >= 1 && start < end && end <= FFT_SIZE / 2);
        }
        assert_eq!(ranges[NUM_BINS - 1].1, FFT_SIZE / 2);
    }

    #[test]
    fn test_reset() {
        let mut analyzer = SpectrumAnalyzer::new(SR, 50);
        analyzer.push_samples(&sine(1000.0, 0.5, 2400));
        analyzer.reset();
        assert_eq!(analyzer.analysed_samples(), 0);
        let frame = analyzer.push_samples(&[0.0; 2400]).unwrap();
        assert_eq!(frame.timestamp_ms, 50);
        assert!(frame.magnitudes.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn test_hann_window() {
        assert!(hann_window(0, FFT_SIZE) < 0.01);
        assert!(hann_window(FFT_SIZE - 1, FFT_SIZE) < 0.01);
        assert!((hann_window(FFT_SIZE / 2, FFT_SIZE) - 1.0).abs() < 0.01);
    }
}
