//! Device boundary: the trait a capture backend implements, and the sink it
//! pushes samples into.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    audio::{CaptureConfig, SampleRate},
    buffering::{Observer, Producer, SampleProducer},
    error::Result,
};

/// A capture backend able to open an input device.
///
/// `open` is always called on the session's capture thread, and the returned
/// stream is dropped on that same thread, so implementations may hand out
/// `!Send` handles (cpal streams are `!Send` on Windows and macOS).
pub trait InputSource: Send + Sync + 'static {
    /// Open the device and start delivering mono f32 blocks into `sink`.
    ///
    /// # Errors
    /// `VoxchatError::DeviceUnavailable` when no device exists, permission is
    /// denied, or the device cannot run at `config.sample_rate`.
    fn open(&self, config: &CaptureConfig, sink: SampleSink) -> Result<Box<dyn InputStream>>;
}

/// A running input stream. Dropping it stops delivery and releases the
/// device; no callback is running once `drop` returns.
pub trait InputStream {
    /// Rate the device is actually delivering at.
    fn sample_rate(&self) -> SampleRate;

    /// Human-readable device name, for logs.
    fn device_name(&self) -> &str;
}

/// Counters shared between the device callback and the collector thread.
#[derive(Debug, Default)]
pub struct CaptureDiagnostics {
    pub samples_in: AtomicUsize,
    pub samples_dropped: AtomicUsize,
    pub chunks_collected: AtomicUsize,
}

impl CaptureDiagnostics {
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            samples_in: self.samples_in.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            chunks_collected: self.chunks_collected.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    pub samples_in: usize,
    pub samples_dropped: usize,
    pub chunks_collected: usize,
}

/// Producer-side handle given to an [`InputSource`].
///
/// [`SampleSink::push`] is wait-free and allocation-free, so it is safe to call
/// from a real-time audio callback.
pub struct SampleSink {
    producer: SampleProducer,
    diagnostics: Arc<CaptureDiagnostics>,
}

impl SampleSink {
    pub fn new(producer: SampleProducer, diagnostics: Arc<CaptureDiagnostics>) -> Self {
        Self {
            producer,
            diagnostics,
        }
    }

    /// Append one block of mono samples in arrival order.
    ///
    /// A block is accepted whole or not at all: when the ring cannot hold all
    /// of it, the entire block is counted in `samples_dropped` (reported by the
    /// collector) and nothing is written. Returns the number of samples
    /// accepted, either `block.len()` or 0.
    pub fn push(&mut self, block: &[f32]) -> usize {
        if self.producer.vacant_len() < block.len() {
            self.diagnostics
                .samples_dropped
                .fetch_add(block.len(), Ordering::Relaxed);
            return 0;
        }
        let written = self.producer.push_slice(block);
        self.diagnostics
            .samples_in
            .fetch_add(written, Ordering::Relaxed);
        written
    }
}

impl std::fmt::Debug for SampleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleSink").finish_non_exhaustive()
    }
}
