//! Nyth Core - Audio Engine
//!
//! This crate wires the `nyth_dsp` stages into a running engine:
//! - A fixed-order audio graph driven once per host buffer
//! - Lock-free parameter snapshots from control threads to the audio thread
//! - A background spectrum analysis thread fed through a ring buffer
//! - A cloneable [`EngineHandle`] for UI threads
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Control Threads                        │
//! │   EngineHandle ──snapshots──▶        ◀──reports/spectrum──  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ crossbeam-channel (1 slot)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Audio Thread                           │
//! │   Noise ─▶ EQ ─▶ Effects ─▶ Safety ─▶ output                │
//! │                                 └──rtrb──▶ analysis thread  │
//! │              (Zero allocation in this path)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod analysis;
mod config;
mod engine;
mod error;
mod graph;
mod params;

pub use analysis::{spectrum_ring, AnalysisThread, SpectrumTap};
pub use config::EngineConfig;
pub use engine::{create_engine, Engine, EngineHandle};
pub use error::{EngineError, EngineResult};
pub use graph::{AudioGraph, RunState};
pub use params::{mailbox, ConfigId, Parameter, ParameterReader, ParameterStore, Publisher, Subscriber};

// Re-export DSP types for convenience
pub use nyth_dsp::{
    AudioSafetyConfig, AudioSafetyReport, CompressorConfig, DelayConfig, EqualizerState,
    NoiseMode, NoiseReductionConfig, Preset, SafetyLevels, SafetyStatistics, SpectrumFrame,
    StageStatus, NUM_BANDS, NUM_BINS, PRESETS,
};
