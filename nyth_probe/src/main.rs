//! Nyth Probe - renders a test signal through the engine and prints what the
//! engine reports about it as JSON.
//!
//! ```text
//! nyth_probe --signal howl --seconds 3 --preset "Vocal Boost" --compressor
//! ```

mod signal;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nyth_core::{
    AudioSafetyReport, CompressorConfig, DelayConfig, Engine, EngineConfig, EngineHandle,
    NoiseMode, NoiseReductionConfig, SafetyStatistics, SpectrumFrame, StageStatus,
};

use signal::{Signal, SignalGenerator};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Render a test signal through the Nyth engine and print its reports as JSON"
)]
struct Cli {
    /// Test signal
    #[arg(long, value_enum, default_value_t = Signal::Sine)]
    signal: Signal,

    /// Audio time to render, in seconds
    #[arg(long, default_value_t = 2.0, value_parser = parse_seconds)]
    seconds: f32,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    /// Frames per callback
    #[arg(long, default_value_t = 512)]
    buffer: u32,

    /// Render one channel instead of two
    #[arg(long)]
    mono: bool,

    /// Apply a built-in EQ preset
    #[arg(long)]
    preset: Option<String>,

    /// Noise reduction mode
    #[arg(long, value_enum, default_value_t = NoiseArg::Expander)]
    noise: NoiseArg,

    /// Do not load the spectral denoiser
    #[arg(long)]
    no_denoiser: bool,

    /// Enable the compressor
    #[arg(long)]
    compressor: bool,

    /// Enable the delay
    #[arg(long)]
    delay: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum NoiseArg {
    Off,
    Expander,
    Rnnoise,
}

impl From<NoiseArg> for NoiseMode {
    fn from(arg: NoiseArg) -> Self {
        match arg {
            NoiseArg::Off => NoiseMode::Off,
            NoiseArg::Expander => NoiseMode::Expander,
            NoiseArg::Rnnoise => NoiseMode::RnNoise,
        }
    }
}

fn parse_seconds(value: &str) -> Result<f32, String> {
    let seconds: f32 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err("must be positive".into());
    }
    Ok(seconds)
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            sample_rate: self.sample_rate,
            buffer_size: self.buffer,
            channels: if self.mono { 1 } else { 2 },
            load_spectral_denoiser: !self.no_denoiser,
            ..Default::default()
        }
    }
}

/// EQ band info in the output
#[derive(Debug, Clone, Serialize)]
struct BandInfo {
    index: usize,
    frequency: f32,
    gain_db: f32,
    enabled: bool,
}

#[derive(Debug, Serialize)]
struct ProbeReport {
    signal: Signal,
    seconds: f32,
    config: EngineConfig,
    preset: Option<String>,
    noise_reduction: StageStatus,
    bands: Vec<BandInfo>,
    safety: AudioSafetyReport,
    statistics: SafetyStatistics,
    spectrum: SpectrumFrame,
}

fn configure(handle: &EngineHandle, cli: &Cli) -> Result<()> {
    if let Some(name) = &cli.preset {
        handle
            .apply_named_preset(name)
            .with_context(|| format!("cannot apply preset '{}'", name))?;
    }

    let mode = NoiseMode::from(cli.noise);
    handle.set_noise_reduction_config(NoiseReductionConfig {
        enabled: mode != NoiseMode::Off,
        mode,
        ..Default::default()
    })?;
    handle.set_compressor_config(CompressorConfig {
        enabled: cli.compressor,
        ..Default::default()
    })?;
    handle.set_delay_config(DelayConfig {
        enabled: cli.delay,
        ..Default::default()
    })?;
    Ok(())
}

fn run(cli: &Cli) -> Result<ProbeReport> {
    let mut engine = Engine::new(cli.engine_config()).context("failed to create engine")?;
    let handle = engine.handle();
    configure(&handle, cli)?;

    let config = engine.config().clone();
    let channels = config.channels as usize;
    let frames = (cli.seconds * config.sample_rate as f32) as usize;
    let mut generator = SignalGenerator::new(cli.signal, config.sample_rate as f32);
    let mut buffer = vec![0.0; config.block_samples()];

    info!(
        "Rendering {:.2}s of {:?} in {} frame buffers",
        cli.seconds, cli.signal, config.buffer_size
    );

    let mut rendered = 0;
    while rendered < frames {
        let len = (frames - rendered).min(config.buffer_size as usize);
        let block = &mut buffer[..len * channels];
        generator.fill(block, channels);
        engine.process(block);
        rendered += len;
    }

    // Let the analysis thread catch up with the last buffer
    let expected_ms = (frames as u64 * 1000 / config.sample_rate as u64) as i64;
    let interval_ms = config.spectrum_interval_ms as i64;
    for _ in 0..200 {
        if handle.spectrum_frame().timestamp_ms + interval_ms > expected_ms {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    let state = handle.equalizer_state();
    let report = ProbeReport {
        signal: cli.signal,
        seconds: cli.seconds,
        config,
        preset: cli.preset.clone(),
        noise_reduction: handle.noise_reduction_status(),
        bands: state
            .bands
            .iter()
            .enumerate()
            .map(|(index, band)| BandInfo {
                index,
                frequency: band.frequency,
                gain_db: band.gain_db,
                enabled: band.enabled,
            })
            .collect(),
        safety: handle.safety_report(),
        statistics: handle.safety_statistics(),
        spectrum: handle.spectrum_frame(),
    };

    engine.destroy();
    Ok(report)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("nyth=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let report = run(&cli)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
