//! Spectrum Analysis Thread
//!
//! The audio thread only mixes its output to mono and pushes it into an
//! `rtrb` ring buffer ([`SpectrumTap`]). A named background thread drains the
//! ring, runs the [`SpectrumAnalyzer`] and stores the newest frame behind a
//! `parking_lot::RwLock` for the UI to copy.
//!
//! ```text
//! audio thread ──rtrb──▶ analysis thread ──RwLock<SpectrumFrame>──▶ UI
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::RwLock;
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::{debug, info, warn};

use nyth_dsp::{SpectrumAnalyzer, SpectrumFrame};

use crate::error::{EngineError, EngineResult};

/// How often the analysis thread wakes up to drain the ring
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Audio-side writer of the spectrum ring
pub struct SpectrumTap {
    producer: Producer<f32>,
    dropped: Arc<AtomicU64>,
}

impl SpectrumTap {
    /// Mix an interleaved buffer to mono and queue it for analysis
    ///
    /// # Real-time Safety
    /// Non-blocking: samples are dropped when the ring is full.
    pub fn push_interleaved(&mut self, buffer: &[f32], channels: usize) {
        let channels = channels.max(1);
        let scale = 1.0 / channels as f32;
        for frame in buffer.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() * scale;
            if self.producer.push(mono).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Count of samples lost because the analysis thread fell behind,
    /// shared with whoever reads it on the control side
    pub fn drop_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.dropped)
    }
}

/// Create the ring shared by the tap and the analysis thread
pub fn spectrum_ring(capacity: usize) -> (SpectrumTap, Consumer<f32>) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    let tap = SpectrumTap {
        producer,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (tap, consumer)
}

/// Handle to the running analysis thread
pub struct AnalysisThread {
    shutdown: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl AnalysisThread {
    pub fn spawn(
        consumer: Consumer<f32>,
        analyzer: SpectrumAnalyzer,
        latest: Arc<RwLock<SpectrumFrame>>,
    ) -> EngineResult<Self> {
        let (shutdown, shutdown_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("nyth-analysis".into())
            .spawn(move || {
                info!("Analysis thread started");
                let mut consumer = consumer;
                let mut analyzer = analyzer;
                loop {
                    drain(&mut consumer, &mut analyzer, &latest);
                    match shutdown_rx.recv_timeout(POLL_INTERVAL) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                // Whatever the audio thread already pushed still gets analysed
                drain(&mut consumer, &mut analyzer, &latest);
                info!(
                    "Analysis thread stopped after {} samples",
                    analyzer.analysed_samples()
                );
            })
            .map_err(|e| EngineError::AnalysisThread(e.to_string()))?;

        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Signal shutdown and join; safe to call more than once
    pub fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.shutdown.try_send(());
        if handle.join().is_err() {
            warn!("Analysis thread panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for AnalysisThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn drain(consumer: &mut Consumer<f32>, analyzer: &mut SpectrumAnalyzer, latest: &RwLock<SpectrumFrame>) {
    let available = consumer.slots();
    if available == 0 {
        return;
    }
    let Ok(chunk) = consumer.read_chunk(available) else {
        return;
    };

    let (first, second) = chunk.as_slices();
    let mut newest = analyzer.push_samples(first);
    if let Some(frame) = analyzer.push_samples(second) {
        newest = Some(frame);
    }
    chunk.commit_all();

    if let Some(frame) = newest {
        debug!("Spectrum frame at {}ms", frame.timestamp_ms);
        *latest.write() = frame;
    }
}
