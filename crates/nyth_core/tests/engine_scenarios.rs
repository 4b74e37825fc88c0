//! End-to-end engine scenarios driven through the public API

use std::thread;
use std::time::{Duration, Instant};

use nyth_core::{
    create_engine, AudioSafetyConfig, CompressorConfig, DelayConfig, Engine, EngineConfig,
    EngineError, EngineHandle, NoiseMode, NoiseReductionConfig, SpectrumFrame, StageStatus,
    NUM_BANDS, NUM_BINS,
};
use nyth_dsp::DspError;

const SR: f32 = 48000.0;

fn sine(freq: f32, amplitude: f32, start: usize, frames: usize, channels: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(frames * channels);
    for i in start..start + frames {
        let s = (2.0 * std::f32::consts::PI * freq * i as f32 / SR).sin() * amplitude;
        for _ in 0..channels {
            out.push(s);
        }
    }
    out
}

/// Disable the stages that colour the signal by default
fn transparent(handle: &EngineHandle) {
    handle
        .set_noise_reduction_config(NoiseReductionConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();
    handle
        .set_safety_config(AudioSafetyConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();
}

fn wait_for_frame(handle: &EngineHandle, timestamp_ms: i64) -> SpectrumFrame {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let frame = handle.spectrum_frame();
        if frame.timestamp_ms >= timestamp_ms || Instant::now() > deadline {
            return frame;
        }
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn silence_in_gives_silence_out() {
    let mut engine = create_engine(48000, 512).unwrap();
    let handle = engine.handle();

    for _ in 0..20 {
        let mut buffer = vec![0.0; 1024];
        engine.process(&mut buffer);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }

    let report = handle.safety_report();
    assert_eq!(report.peak, 0.0);
    assert_eq!(report.rms, 0.0);
    assert_eq!(report.clipped_samples, 0);
    assert!(!report.overload);
    assert!(!report.feedback_likely);
}

#[test]
fn band_gain_round_trip_and_rejection() {
    let engine = create_engine(48000, 256).unwrap();
    let handle = engine.handle();

    for band in 0..NUM_BANDS {
        handle.set_band_gain(band, band as f32 - 4.0).unwrap();
    }
    let state = handle.equalizer_state();
    for band in 0..NUM_BANDS {
        assert_eq!(state.bands[band].gain_db, band as f32 - 4.0);
    }

    let err = handle.set_band_gain(12, 3.0).unwrap_err();
    assert!(matches!(err, EngineError::DspError(DspError::InvalidBandIndex(12))));
    assert_eq!(handle.equalizer_state(), state);
}

#[test]
fn preset_round_trip_is_idempotent() {
    let engine = create_engine(48000, 256).unwrap();
    let handle = engine.handle();
    let gains = [6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0, -1.0, -2.0, 30.0];

    handle.apply_preset(&gains).unwrap();
    let first = handle.equalizer_state();
    handle.apply_preset(&gains).unwrap();
    assert_eq!(handle.equalizer_state(), first);

    let applied = first.gains();
    assert_eq!(&applied[..9], &gains[..9]);
    assert_eq!(applied[9], 18.0);

    let err = handle.apply_preset(&gains[..9]).unwrap_err();
    assert!(matches!(err, EngineError::DspError(DspError::InvalidPresetLength(9))));
    assert_eq!(handle.equalizer_state(), first);
}

#[test]
fn limiter_holds_the_ceiling() {
    let mut engine = create_engine(48000, 512).unwrap();
    let handle = engine.handle();
    handle
        .set_noise_reduction_config(NoiseReductionConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();
    handle.set_master_gain(12.0).unwrap();

    let ceiling = 10.0_f32.powf(-1.0 / 20.0);
    let mut peak = 0.0_f32;
    for block in 0..40 {
        let mut buffer = sine(1000.0, 0.9, block * 512, 512, 2);
        engine.process(&mut buffer);
        peak = buffer.iter().fold(peak, |a, s| a.max(s.abs()));
    }

    assert!(peak <= ceiling + 1e-4, "peak {} above ceiling {}", peak, ceiling);
    assert!(handle.safety_report().overload);
}

#[test]
fn spectrum_frames_track_the_output() {
    let mut engine = create_engine(48000, 512).unwrap();
    let handle = engine.handle();
    handle
        .set_noise_reduction_config(NoiseReductionConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();

    // Half a second of a 1kHz tone
    for block in 0..47 {
        let mut buffer = sine(1000.0, 0.5, block * 512, 512, 2);
        engine.process(&mut buffer);
    }

    let frame = wait_for_frame(&handle, 450);
    assert!(frame.timestamp_ms >= 450, "no frame after {}ms", frame.timestamp_ms);
    assert_eq!(frame.magnitudes.len(), NUM_BINS);
    assert!(frame.magnitudes.iter().all(|&m| (0.0..=1.0).contains(&m)));
    let peak = frame.peak_bin();
    assert!((16..=18).contains(&peak), "peak bin {}", peak);
}

#[test]
fn spectrum_reads_are_stable_between_buffers() {
    let mut engine = create_engine(48000, 512).unwrap();
    let handle = engine.handle();

    for block in 0..12 {
        let mut buffer = sine(440.0, 0.4, block * 512, 512, 2);
        engine.process(&mut buffer);
    }
    let first = wait_for_frame(&handle, 100);
    assert!(first.timestamp_ms >= 100);

    // The analysis thread has nothing new to work on
    let again = handle.spectrum_frame();
    assert_eq!(again, first);
    assert_eq!(again.timestamp_ms, first.timestamp_ms);
    assert_eq!(handle.dropped_spectrum_samples(), 0);
}

#[test]
fn non_finite_compressor_is_rejected_and_audio_survives() {
    let mut engine = create_engine(48000, 512).unwrap();
    let handle = engine.handle();
    transparent(&handle);

    let err = handle
        .set_compressor_config(CompressorConfig {
            enabled: true,
            makeup_db: f32::NAN,
            ..Default::default()
        })
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParameter(_)));

    let mut warmup = sine(1000.0, 0.3, 0, 512, 2);
    engine.process(&mut warmup);
    let input = sine(1000.0, 0.3, 512, 512, 2);
    let mut buffer = input.clone();
    engine.process(&mut buffer);
    assert!(buffer.iter().all(|s| s.is_finite()));
    assert_eq!(buffer, input);
}

#[test]
fn quiet_voiced_audio_is_not_overload() {
    let mut engine = create_engine(48000, 512).unwrap();
    let handle = engine.handle();
    handle
        .set_noise_reduction_config(NoiseReductionConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();

    // 150Hz fundamental with four overtones, peak well under 0.1
    for block in 0..20 {
        let mut buffer: Vec<f32> = (block * 512..(block + 1) * 512)
            .flat_map(|i| {
                let s: f32 = (1..=5)
                    .map(|h| {
                        let phase = 2.0 * std::f32::consts::PI * 150.0 * h as f32 * i as f32 / SR;
                        phase.sin() * 0.02 / h as f32
                    })
                    .sum();
                [s, s]
            })
            .collect();
        engine.process(&mut buffer);
    }

    let report = handle.safety_report();
    assert!(report.peak < 0.1, "peak {}", report.peak);
    assert!(!report.overload);
    assert_eq!(handle.safety_statistics().total_overload_buffers, 0);
}

#[test]
fn safety_statistics_accumulate() {
    let mut engine = create_engine(48000, 256).unwrap();
    let handle = engine.handle();
    handle
        .set_noise_reduction_config(NoiseReductionConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();

    for block in 0..10 {
        let amplitude = if block == 5 { 1.5 } else { 0.2 };
        let mut buffer = sine(500.0, amplitude, block * 256, 256, 2);
        engine.process(&mut buffer);
    }

    let stats = handle.safety_statistics();
    assert_eq!(stats.total_buffers, 10);
    assert_eq!(stats.total_overload_buffers, 1);
    assert!(stats.total_clipped_samples > 0);
    assert!(stats.max.peak > 1.4);
    assert!(stats.min.peak < 0.21);
    assert!(stats.min.peak <= stats.avg.peak && stats.avg.peak <= stats.max.peak);
}

#[test]
fn odd_length_buffer_zeroes_the_stray_sample() {
    let mut engine = create_engine(48000, 512).unwrap();
    let handle = engine.handle();
    transparent(&handle);

    let mut buffer = sine(440.0, 0.3, 0, 200, 2);
    buffer.push(5.0);
    engine.process(&mut buffer);
    assert_eq!(buffer.len(), 401);
    assert_eq!(buffer[400], 0.0);

    let mut buffer = vec![0.1; 3];
    buffer[2] = f32::NAN;
    engine.process(&mut buffer);
    assert_eq!(buffer[2], 0.0);
}

#[test]
fn delay_onset_is_exact() {
    let mut engine = Engine::new(EngineConfig {
        channels: 1,
        ..Default::default()
    })
    .unwrap();
    let handle = engine.handle();
    transparent(&handle);
    handle
        .set_delay_config(DelayConfig {
            enabled: true,
            delay_ms: 150.0,
            feedback: 0.0,
            mix: 1.0,
        })
        .unwrap();

    let mut warmup = vec![0.0; 512];
    engine.process(&mut warmup);

    let mut output = Vec::new();
    for block in 0..16 {
        let mut buffer = vec![0.0; 512];
        if block == 0 {
            buffer[0] = 1.0;
        }
        engine.process(&mut buffer);
        output.extend_from_slice(&buffer);
    }

    assert!((output[7200] - 1.0).abs() < 1e-6);
    assert!(output[..7200].iter().all(|&s| s.abs() < 1e-6));
    assert!(output[7201..].iter().all(|&s| s.abs() < 1e-6));
}

#[test]
fn stop_fades_out_then_stays_silent() {
    let mut engine = create_engine(48000, 256).unwrap();
    let handle = engine.handle();
    transparent(&handle);

    let mut warmup = vec![0.5; 512];
    engine.process(&mut warmup);

    handle.stop();
    let mut fading = vec![0.5; 512];
    engine.process(&mut fading);
    let left: Vec<f32> = fading.iter().step_by(2).copied().collect();
    assert!(left[0] > 0.49);
    assert!(left.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(left[left.len() - 1], 0.0);

    for _ in 0..4 {
        let mut buffer = vec![0.5; 512];
        engine.process(&mut buffer);
        assert!(buffer.iter().all(|&s| s == 0.0));
    }
}

#[test]
fn missing_denoiser_degrades_to_bypass() {
    let mut engine = Engine::new(EngineConfig {
        load_spectral_denoiser: false,
        ..Default::default()
    })
    .unwrap();
    let handle = engine.handle();
    handle
        .set_safety_config(AudioSafetyConfig {
            enabled: false,
            ..Default::default()
        })
        .unwrap();
    let status = handle
        .set_noise_reduction_config(NoiseReductionConfig {
            mode: NoiseMode::RnNoise,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(status, StageStatus::Degraded);

    // First buffer crossfades away from the expander
    let mut warmup = sine(440.0, 0.3, 0, 512, 2);
    engine.process(&mut warmup);

    let input = sine(440.0, 0.3, 512, 512, 2);
    let mut buffer = input.clone();
    engine.process(&mut buffer);
    assert_eq!(buffer, input);
}

#[test]
fn handles_work_from_other_threads() {
    let mut engine = create_engine(48000, 256).unwrap();
    let handle = engine.handle();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let handle = handle.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    handle.set_band_gain(t, i as f32 * 0.1).unwrap();
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }

    let mut buffer = vec![0.0; 512];
    engine.process(&mut buffer);
    let state = handle.equalizer_state();
    for band in 0..4 {
        assert!((state.bands[band].gain_db - 4.9).abs() < 1e-4);
    }
}

#[test]
fn destroyed_engine_rejects_changes() {
    let engine = create_engine(48000, 256).unwrap();
    let handle = engine.handle();
    handle.set_band_gain(2, 3.0).unwrap();
    engine.destroy();

    assert!(matches!(handle.set_band_gain(2, 6.0), Err(EngineError::Destroyed)));
    assert!(matches!(
        handle.set_delay_config(DelayConfig::default()),
        Err(EngineError::Destroyed)
    ));
    assert_eq!(handle.equalizer_state().bands[2].gain_db, 3.0);
}
