//! Audio engine benchmarks
//!
//! Measures the full processing chain and the control-side publish path.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use nyth_core::{create_engine, CompressorConfig, DelayConfig, EngineConfig, Engine, NoiseMode, NoiseReductionConfig};

fn benchmark_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_process");

    // Typical buffer sizes used in real-time audio
    for buffer_size in [64, 128, 256, 512, 1024].iter() {
        let mut engine = create_engine(48000, *buffer_size).unwrap();

        // Create test buffer (stereo interleaved)
        let mut buffer: Vec<f32> = (0..*buffer_size as usize * 2)
            .map(|i| (i as f32 * 0.001).sin() * 0.5)
            .collect();

        group.throughput(Throughput::Elements(*buffer_size as u64 * 2));
        group.bench_function(format!("process_{}_samples", buffer_size), |b| {
            b.iter(|| {
                engine.process(black_box(&mut buffer));
            })
        });
    }

    group.finish();
}

fn benchmark_full_chain(c: &mut Criterion) {
    let mut engine = Engine::new(EngineConfig::new(48000, 512)).unwrap();
    let handle = engine.handle();
    handle.apply_named_preset("Loudness").unwrap();
    handle
        .set_noise_reduction_config(NoiseReductionConfig {
            mode: NoiseMode::RnNoise,
            ..Default::default()
        })
        .unwrap();
    handle
        .set_compressor_config(CompressorConfig {
            enabled: true,
            ..Default::default()
        })
        .unwrap();
    handle
        .set_delay_config(DelayConfig {
            enabled: true,
            ..Default::default()
        })
        .unwrap();

    let mut buffer: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.01).sin() * 0.3).collect();

    c.bench_function("full_chain_512_frames", |b| {
        b.iter(|| {
            engine.process(black_box(&mut buffer));
        })
    });
}

fn benchmark_parameter_publish(c: &mut Criterion) {
    let engine = create_engine(48000, 256).unwrap();
    let handle = engine.handle();

    c.bench_function("set_band_gain", |b| {
        let mut gain = 0.0_f32;
        b.iter(|| {
            gain = if gain > 10.0 { -10.0 } else { gain + 0.5 };
            handle.set_band_gain(black_box(4), black_box(gain)).unwrap();
        })
    });
}

criterion_group!(benches, benchmark_engine, benchmark_full_chain, benchmark_parameter_publish);
criterion_main!(benches);
