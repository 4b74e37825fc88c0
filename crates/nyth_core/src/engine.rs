//! Audio Engine - Main Entry Point
//!
//! [`Engine`] is owned by whoever drives the audio callback and exposes a
//! single `process` call. [`EngineHandle`] is the control surface: cloneable,
//! `Send + Sync`, and safe to call from any UI thread at any time.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    UI / control threads                       │
//! │  EngineHandle ──ParameterStore──▶   ◀──reports / spectrum──   │
//! └───────────────────────────────────────────────────────────────┘
//!                   │ single-slot mailboxes      ▲ RwLock<SpectrumFrame>
//!                   ▼                            │
//! ┌───────────────────────────────┐   ┌────────────────────────────┐
//! │ Audio thread: Engine::process │──▶│ Analysis thread (rtrb tap) │
//! │   (zero allocation, no locks) │   └────────────────────────────┘
//! └───────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use nyth_dsp::{
    status_for, AudioSafetyConfig, AudioSafetyReport, CompressorConfig, DelayConfig,
    EqualizerState, NoiseReductionConfig, Preset, ProcessContext, SafetyStatistics,
    SpectralDenoiser, SpectrumAnalyzer, SpectrumFrame, StageStatus, MAX_GAIN_DB, MIN_GAIN_DB,
};

use crate::analysis::{spectrum_ring, AnalysisThread};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::graph::AudioGraph;
use crate::params::{mailbox, Parameter, ParameterStore, Subscriber};

/// Control-side state shared by every handle clone
struct Shared {
    params: ParameterStore,
    /// Authoritative equalizer state; every change publishes a full copy
    equalizer: Mutex<EqualizerState>,
    noise_reduction: Mutex<NoiseReductionConfig>,
    denoiser_available: bool,
    reports: Mutex<Subscriber<AudioSafetyReport>>,
    statistics: Mutex<Subscriber<SafetyStatistics>>,
    spectrum: Arc<RwLock<SpectrumFrame>>,
    /// Samples the spectrum tap dropped because the ring was full
    dropped_spectrum: Arc<AtomicU64>,
    stop_requested: Arc<AtomicBool>,
    destroyed: AtomicBool,
}

/// Cloneable control surface of an [`Engine`]
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<Shared>,
}

impl EngineHandle {
    fn ensure_alive(&self) -> EngineResult<()> {
        if self.shared.destroyed.load(Ordering::Acquire) {
            return Err(EngineError::Destroyed);
        }
        Ok(())
    }

    /// Update the equalizer under the lock and publish the result
    fn update_equalizer<F>(&self, update: F) -> EngineResult<EqualizerState>
    where
        F: FnOnce(&mut EqualizerState) -> EngineResult<()>,
    {
        self.ensure_alive()?;
        let mut guard = self.shared.equalizer.lock();
        // Edit a copy so a rejected change leaves the state untouched
        let mut next = *guard;
        if let Err(e) = update(&mut next) {
            warn!("Rejected equalizer change: {}", e);
            return Err(e);
        }
        *guard = next;
        self.shared.params.publish(Parameter::Equalizer(next));
        Ok(next)
    }

    /// Set one band's gain; clamped to [-18, 18] dB
    pub fn set_band_gain(&self, band: usize, gain_db: f32) -> EngineResult<()> {
        if !gain_db.is_finite() {
            warn!("Rejected non-finite gain for band {}", band);
            return Err(EngineError::InvalidParameter(format!("band gain {}", gain_db)));
        }
        self.update_equalizer(|state| Ok(state.set_band_gain(band, gain_db)?))?;
        debug!("Set band {} gain to {}dB", band, gain_db);
        Ok(())
    }

    /// Set the equalizer output gain in dB
    pub fn set_master_gain(&self, gain_db: f32) -> EngineResult<()> {
        if !gain_db.is_finite() {
            warn!("Rejected non-finite master gain");
            return Err(EngineError::InvalidParameter(format!("master gain {}", gain_db)));
        }
        let gain_db = gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        self.update_equalizer(|state| {
            state.master_gain_db = gain_db;
            Ok(())
        })?;
        debug!("Set master gain to {}dB", gain_db);
        Ok(())
    }

    /// Replace all ten band gains in a single snapshot
    pub fn apply_preset(&self, gains: &[f32]) -> EngineResult<()> {
        if gains.iter().any(|g| !g.is_finite()) {
            warn!("Rejected preset with non-finite gains");
            return Err(EngineError::InvalidParameter("preset gains must be finite".into()));
        }
        self.update_equalizer(|state| Ok(state.apply_gains(gains)?))?;
        debug!("Applied preset gains {:?}", gains);
        Ok(())
    }

    /// Apply a built-in preset by name (case-insensitive)
    pub fn apply_named_preset(&self, name: &str) -> EngineResult<Preset> {
        let preset = Preset::builtin(name).map_err(|e| {
            warn!("{}", e);
            EngineError::from(e)
        })?;
        self.apply_preset(&preset.gains)?;
        info!("Applied preset '{}'", preset.name);
        Ok(preset)
    }

    pub fn set_equalizer_enabled(&self, enabled: bool) -> EngineResult<()> {
        self.update_equalizer(|state| {
            state.enabled = enabled;
            Ok(())
        })?;
        debug!("Set equalizer enabled: {}", enabled);
        Ok(())
    }

    /// Copy of the current equalizer state
    pub fn equalizer_state(&self) -> EqualizerState {
        *self.shared.equalizer.lock()
    }

    /// Publish a noise reduction config; returns the resulting status
    pub fn set_noise_reduction_config(&self, config: NoiseReductionConfig) -> EngineResult<StageStatus> {
        self.ensure_alive()?;
        let config = config.sanitized();
        *self.shared.noise_reduction.lock() = config;
        self.shared.params.publish(Parameter::NoiseReduction(config));

        let status = status_for(&config, self.shared.denoiser_available);
        if status == StageStatus::Degraded {
            warn!("Spectral denoiser unavailable; noise reduction falls back to bypass");
        }
        debug!("Set noise reduction {:?} ({:?})", config.mode, status);
        Ok(status)
    }

    pub fn noise_reduction_config(&self) -> NoiseReductionConfig {
        *self.shared.noise_reduction.lock()
    }

    pub fn noise_reduction_status(&self) -> StageStatus {
        status_for(&self.shared.noise_reduction.lock(), self.shared.denoiser_available)
    }

    pub fn set_safety_config(&self, config: AudioSafetyConfig) -> EngineResult<()> {
        self.ensure_alive()?;
        let config = config.sanitized();
        self.shared.params.publish(Parameter::Safety(config));
        debug!("Set safety config: {:?}", config);
        Ok(())
    }

    /// Report of the most recently processed buffer
    pub fn safety_report(&self) -> AudioSafetyReport {
        self.shared.reports.lock().read()
    }

    /// Totals over every buffer the safety stage has analysed
    pub fn safety_statistics(&self) -> SafetyStatistics {
        self.shared.statistics.lock().read()
    }

    /// Rejects NaN or infinite fields; finite values are clamped
    pub fn set_compressor_config(&self, config: CompressorConfig) -> EngineResult<()> {
        self.ensure_alive()?;
        if !config.is_finite() {
            warn!("Rejected compressor config with non-finite fields: {:?}", config);
            return Err(EngineError::InvalidParameter(format!(
                "compressor config {:?}",
                config
            )));
        }
        let config = config.sanitized();
        self.shared.params.publish(Parameter::Compressor(config));
        debug!("Set compressor config: {:?}", config);
        Ok(())
    }

    pub fn set_delay_config(&self, config: DelayConfig) -> EngineResult<()> {
        self.ensure_alive()?;
        let config = config.sanitized();
        self.shared.params.publish(Parameter::Delay(config));
        debug!("Set delay config: {:?}", config);
        Ok(())
    }

    /// Newest spectrum frame
    pub fn spectrum_frame(&self) -> SpectrumFrame {
        *self.shared.spectrum.read()
    }

    pub fn dropped_spectrum_samples(&self) -> u64 {
        self.shared.dropped_spectrum.load(Ordering::Relaxed)
    }

    /// Fade the output to silence over the next buffer and flush all state
    pub fn stop(&self) {
        if !self.shared.stop_requested.swap(true, Ordering::AcqRel) {
            info!("Stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop_requested.load(Ordering::Acquire)
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }
}

/// The processing engine, driven by the audio callback
pub struct Engine {
    config: EngineConfig,
    graph: AudioGraph,
    handle: EngineHandle,
    analysis: AnalysisThread,
}

impl Engine {
    /// Create an engine and start its analysis thread
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;

        let sample_rate = config.sample_rate as f32;
        let context = ProcessContext::new(
            sample_rate,
            config.channels as usize,
            config.buffer_size as usize,
        );

        let denoiser = if config.load_spectral_denoiser {
            match SpectralDenoiser::new(sample_rate) {
                Ok(denoiser) => Some(denoiser),
                Err(e) => {
                    warn!("Failed to load spectral denoiser: {}", e);
                    None
                }
            }
        } else {
            warn!("Spectral denoiser disabled; rnnoise mode will be degraded");
            None
        };
        let denoiser_available = denoiser.is_some();

        let (params, reader) = ParameterStore::pair();
        let (report_tx, report_rx) = mailbox(AudioSafetyReport::default());
        let (statistics_tx, statistics_rx) = mailbox(SafetyStatistics::default());
        let stop_requested = Arc::new(AtomicBool::new(false));
        let spectrum = Arc::new(RwLock::new(SpectrumFrame::default()));

        // One second of mono audio gives the analysis thread ample slack
        let (tap, consumer) = spectrum_ring(config.sample_rate as usize);
        let dropped_spectrum = tap.drop_counter();
        let analyzer = SpectrumAnalyzer::new(sample_rate, config.spectrum_interval_ms);
        let analysis = AnalysisThread::spawn(consumer, analyzer, Arc::clone(&spectrum))?;

        let mut graph = AudioGraph::new(
            context,
            denoiser,
            reader,
            report_tx,
            statistics_tx,
            Arc::clone(&stop_requested),
        );
        graph.set_tap(tap);

        let handle = EngineHandle {
            shared: Arc::new(Shared {
                params,
                equalizer: Mutex::new(EqualizerState::default()),
                noise_reduction: Mutex::new(NoiseReductionConfig::default()),
                denoiser_available,
                reports: Mutex::new(report_rx),
                statistics: Mutex::new(statistics_rx),
                spectrum,
                dropped_spectrum,
                stop_requested,
                destroyed: AtomicBool::new(false),
            }),
        };

        info!(
            "Engine created: {}Hz, {} channel(s), {} frame blocks ({:.1}ms)",
            config.sample_rate,
            config.channels,
            config.buffer_size,
            config.latency_ms()
        );

        Ok(Self {
            config,
            graph,
            handle,
            analysis,
        })
    }

    /// Process one interleaved buffer in place; call once per audio callback
    pub fn process(&mut self, buffer: &mut [f32]) {
        self.graph.process(buffer);
    }

    /// Control surface for UI threads
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Flush all stage state, stop the analysis thread and release the engine
    pub fn destroy(self) {
        drop(self);
    }

    fn shutdown(&mut self) {
        if self.handle.shared.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.graph.reset();
        self.analysis.stop();
        let dropped = self.handle.dropped_spectrum_samples();
        if dropped > 0 {
            warn!("Spectrum tap dropped {} samples", dropped);
        }
        info!("Engine destroyed");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Create an engine with default settings for the given rate and block size
pub fn create_engine(sample_rate: u32, buffer_size: u32) -> EngineResult<Engine> {
    Engine::new(EngineConfig::new(sample_rate, buffer_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use nyth_dsp::{DspError, NoiseMode, NUM_BANDS};

    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_send<T: Send>() {}

    #[test]
    fn test_thread_safety_bounds() {
        assert_send_sync::<EngineHandle>();
        assert_send::<Engine>();
    }

    #[test]
    fn test_create_engine() {
        let engine = create_engine(48000, 256).unwrap();
        assert_eq!(engine.config().buffer_size, 256);
        assert!(engine.analysis.is_running());
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            create_engine(1000, 256),
            Err(EngineError::InvalidConfig(_))
        ));
        assert!(create_engine(48000, 0).is_err());
    }

    #[test]
    fn test_band_gain_round_trip() {
        let engine = create_engine(48000, 256).unwrap();
        let handle = engine.handle();
        handle.set_band_gain(3, 4.5).unwrap();
        assert_eq!(handle.equalizer_state().bands[3].gain_db, 4.5);

        handle.set_band_gain(0, 40.0).unwrap();
        assert_eq!(handle.equalizer_state().bands[0].gain_db, 18.0);
    }

    #[test]
    fn test_invalid_band_leaves_state() {
        let engine = create_engine(48000, 256).unwrap();
        let handle = engine.handle();
        handle.set_band_gain(1, 3.0).unwrap();
        let before = handle.equalizer_state();

        let err = handle.set_band_gain(NUM_BANDS, 6.0).unwrap_err();
        assert!(matches!(
            err,
            EngineError::DspError(DspError::InvalidBandIndex(10))
        ));
        assert_eq!(handle.equalizer_state(), before);
        assert!(handle.set_band_gain(2, f32::NAN).is_err());
        assert_eq!(handle.equalizer_state(), before);
    }

    #[test]
    fn test_named_preset() {
        let engine = create_engine(48000, 256).unwrap();
        let handle = engine.handle();
        let preset = handle.apply_named_preset("bass boost").unwrap();
        assert_eq!(handle.equalizer_state().gains(), preset.gains);
        assert!(handle.apply_named_preset("nope").is_err());
        assert_eq!(handle.equalizer_state().gains(), preset.gains);
    }

    #[test]
    fn test_noise_status_follows_denoiser() {
        let engine = Engine::new(EngineConfig {
            load_spectral_denoiser: false,
            ..Default::default()
        })
        .unwrap();
        let handle = engine.handle();
        assert_eq!(handle.noise_reduction_status(), StageStatus::Active);

        let status = handle
            .set_noise_reduction_config(NoiseReductionConfig {
                mode: NoiseMode::RnNoise,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(status, StageStatus::Degraded);
        assert_eq!(handle.noise_reduction_status(), StageStatus::Degraded);
    }

    #[test]
    fn test_handle_after_destroy() {
        let engine = create_engine(48000, 256).unwrap();
        let handle = engine.handle();
        engine.destroy();

        assert!(handle.is_destroyed());
        assert!(matches!(
            handle.set_band_gain(0, 1.0),
            Err(EngineError::Destroyed)
        ));
        // Reads keep returning the last known values
        let _ = handle.safety_report();
        let _ = handle.spectrum_frame();
    }

    #[test]
    fn test_non_finite_compressor_rejected() {
        let engine = create_engine(48000, 256).unwrap();
        let handle = engine.handle();
        let err = handle
            .set_compressor_config(CompressorConfig {
                enabled: true,
                threshold_db: f32::NAN,
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
        assert!(handle
            .set_compressor_config(CompressorConfig {
                makeup_db: f32::INFINITY,
                ..Default::default()
            })
            .is_err());
        assert!(handle.set_compressor_config(CompressorConfig::default()).is_ok());
    }

    #[test]
    fn test_statistics_start_empty() {
        let engine = create_engine(48000, 256).unwrap();
        let handle = engine.handle();
        assert_eq!(handle.safety_statistics(), SafetyStatistics::default());
        assert_eq!(handle.dropped_spectrum_samples(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let engine = create_engine(48000, 256).unwrap();
        let handle = engine.handle();
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
    }
}
