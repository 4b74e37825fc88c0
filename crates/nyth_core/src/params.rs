//! Parameter Store
//!
//! Lock-free exchange of configuration snapshots between control threads and
//! the audio thread.
//!
//! Each config id gets a single-slot mailbox built on a bounded
//! `crossbeam-channel` of capacity one. Publishing replaces whatever value is
//! still pending; the reader drains the slot into a local cached copy. All
//! values are `Copy`, so a snapshot moves as a whole and never allocates.
//!
//! ```text
//!  UI thread(s)                          audio thread
//!  ParameterStore::publish ──[slot]──▶ Subscriber::poll / read
//!                                        (keeps the last value seen)
//! ```

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use nyth_dsp::{AudioSafetyConfig, CompressorConfig, DelayConfig, EqualizerState, NoiseReductionConfig};

/// Writing half of a single-slot mailbox
pub struct Publisher<T> {
    sender: Sender<T>,
    /// Used to evict a value the reader has not picked up yet
    evict: Receiver<T>,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            evict: self.evict.clone(),
        }
    }
}

impl<T: Copy> Publisher<T> {
    /// Replace the pending value; last write wins
    pub fn publish(&self, value: T) {
        let mut value = value;
        loop {
            match self.sender.try_send(value) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    // Drop the stale value and retry with ours
                    let _ = self.evict.try_recv();
                    value = rejected;
                }
                // The publisher holds a receiver, so this only happens mid-teardown
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Reading half of a single-slot mailbox
pub struct Subscriber<T> {
    receiver: Receiver<T>,
    current: T,
}

impl<T: Copy> Subscriber<T> {
    /// Latest value, picking up a pending publish if there is one
    ///
    /// # Real-time Safety
    /// Non-blocking; never allocates.
    pub fn read(&mut self) -> T {
        self.poll();
        self.current
    }

    /// `Some` only when a new value arrived since the previous call
    pub fn poll(&mut self) -> Option<T> {
        let mut updated = None;
        while let Ok(value) = self.receiver.try_recv() {
            updated = Some(value);
        }
        if let Some(value) = updated {
            self.current = value;
        }
        updated
    }

    /// Last value seen, without checking for a new one
    pub fn cached(&self) -> T {
        self.current
    }
}

/// Create a mailbox whose reader starts out holding `initial`
pub fn mailbox<T: Copy>(initial: T) -> (Publisher<T>, Subscriber<T>) {
    let (sender, receiver) = bounded(1);
    (
        Publisher {
            sender,
            evict: receiver.clone(),
        },
        Subscriber {
            receiver,
            current: initial,
        },
    )
}

/// Identifies one configuration slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConfigId {
    Equalizer,
    NoiseReduction,
    Safety,
    Compressor,
    Delay,
}

/// A configuration snapshot tagged with its slot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parameter {
    Equalizer(EqualizerState),
    NoiseReduction(NoiseReductionConfig),
    Safety(AudioSafetyConfig),
    Compressor(CompressorConfig),
    Delay(DelayConfig),
}

impl Parameter {
    pub fn id(&self) -> ConfigId {
        match self {
            Parameter::Equalizer(_) => ConfigId::Equalizer,
            Parameter::NoiseReduction(_) => ConfigId::NoiseReduction,
            Parameter::Safety(_) => ConfigId::Safety,
            Parameter::Compressor(_) => ConfigId::Compressor,
            Parameter::Delay(_) => ConfigId::Delay,
        }
    }
}

/// Control-side half of the store; cheap to clone and share
#[derive(Clone)]
pub struct ParameterStore {
    equalizer: Publisher<EqualizerState>,
    noise_reduction: Publisher<NoiseReductionConfig>,
    safety: Publisher<AudioSafetyConfig>,
    compressor: Publisher<CompressorConfig>,
    delay: Publisher<DelayConfig>,
}

/// Audio-side half of the store
pub struct ParameterReader {
    pub equalizer: Subscriber<EqualizerState>,
    pub noise_reduction: Subscriber<NoiseReductionConfig>,
    pub safety: Subscriber<AudioSafetyConfig>,
    pub compressor: Subscriber<CompressorConfig>,
    pub delay: Subscriber<DelayConfig>,
}

impl ParameterStore {
    /// Create both halves; readers start from each config's default
    pub fn pair() -> (ParameterStore, ParameterReader) {
        let (equalizer, equalizer_rx) = mailbox(EqualizerState::default());
        let (noise_reduction, noise_reduction_rx) = mailbox(NoiseReductionConfig::default());
        let (safety, safety_rx) = mailbox(AudioSafetyConfig::default());
        let (compressor, compressor_rx) = mailbox(CompressorConfig::default());
        let (delay, delay_rx) = mailbox(DelayConfig::default());

        (
            ParameterStore {
                equalizer,
                noise_reduction,
                safety,
                compressor,
                delay,
            },
            ParameterReader {
                equalizer: equalizer_rx,
                noise_reduction: noise_reduction_rx,
                safety: safety_rx,
                compressor: compressor_rx,
                delay: delay_rx,
            },
        )
    }

    /// Publish a snapshot; visible to the audio thread at its next buffer
    pub fn publish(&self, parameter: Parameter) {
        match parameter {
            Parameter::Equalizer(state) => self.equalizer.publish(state),
            Parameter::NoiseReduction(config) => self.noise_reduction.publish(config),
            Parameter::Safety(config) => self.safety.publish(config),
            Parameter::Compressor(config) => self.compressor.publish(config),
            Parameter::Delay(config) => self.delay.publish(config),
        }
    }
}
