//! Audio Processor Trait
//!
//! Defines the interface shared by every stage of the processing chain.
//! The graph calls stages in a fixed order through concrete types, so the
//! trait is a uniform surface rather than a dynamic plugin mechanism.

/// Maximum number of interleaved channels a stage keeps state for
pub const MAX_CHANNELS: usize = 2;

/// Context passed to processors containing stream metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessContext {
    pub sample_rate: f32,
    pub channels: usize,
    pub buffer_size: usize,
}

impl ProcessContext {
    pub fn new(sample_rate: f32, channels: usize, buffer_size: usize) -> Self {
        Self {
            sample_rate,
            channels: channels.clamp(1, MAX_CHANNELS),
            buffer_size,
        }
    }

    /// Number of frames contained in an interleaved buffer
    #[inline]
    pub fn frames(&self, buffer: &[f32]) -> usize {
        buffer.len() / self.channels
    }
}

/// Trait for audio processors in the DSP chain
///
/// # Real-time Safety Contract
///
/// Implementors MUST follow these rules in `process()`:
/// - NO heap allocations (no Vec::push, no Box::new, no String)
/// - NO syscalls (no file I/O, no network, no mutex locks)
/// - NO unbounded loops
/// - Constant or O(n) time complexity where n = buffer size
///
/// Violating these rules causes audio dropouts ("glitches").
pub trait AudioProcessor: Send {
    /// Process audio buffer in-place
    ///
    /// Buffer format is interleaved: [L0, R0, L1, R1, ...] for stereo,
    /// plain samples for mono.
    fn process(&mut self, buffer: &mut [f32], context: &ProcessContext);

    /// Reset internal state (delay lines, envelopes, etc.)
    fn reset(&mut self);

    /// Human-readable name for debugging/UI
    fn name(&self) -> &'static str;

    /// Whether this processor is currently enabled
    fn is_enabled(&self) -> bool {
        true
    }
}
