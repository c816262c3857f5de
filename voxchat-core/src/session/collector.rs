//! Collector loop: the consumer side of the sample ring.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Drain the ring into a scratch slice
//! 2. Re-block into fixed-size SampleChunks (ChunkAssembler)
//! 3. Append completed chunks to the ChunkBuffer, emit one activity event each
//! 4. Sleep briefly when the ring is empty
//! ```
//!
//! ## Teardown order
//!
//! ```text
//! running = false → loop exits → stream dropped (device released,
//! last callback finished) → ring drained to empty → tail chunk flushed
//! ```
//!
//! Dropping the stream before the final drain guarantees that a block the
//! driver was delivering when `stop()` arrived is collected in full.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    audio::{CaptureDiagnostics, InputStream, SampleRate},
    buffering::{ChunkAssembler, ChunkBuffer, Consumer, SampleConsumer},
    events::AudioActivityEvent,
};

/// Samples drained from the ring per pop.
const DRAIN_CHUNK: usize = 1024;

/// Sleep when the ring is empty.
const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// Everything the collector thread owns for one recording.
pub struct CollectorContext {
    /// The open device. Dropped by [`run`] before the final drain.
    pub stream: Box<dyn InputStream>,
    pub consumer: SampleConsumer,
    pub running: Arc<AtomicBool>,
    pub block_size: usize,
    pub sample_rate: SampleRate,
    pub diagnostics: Arc<CaptureDiagnostics>,
    pub activity_tx: broadcast::Sender<AudioActivityEvent>,
}

struct Collector {
    assembler: ChunkAssembler,
    buffer: ChunkBuffer,
    scratch: Vec<f32>,
    sample_rate: SampleRate,
    diagnostics: Arc<CaptureDiagnostics>,
    activity_tx: broadcast::Sender<AudioActivityEvent>,
    dropped_reported: usize,
}

impl Collector {
    /// Pop whatever is in the ring. Returns the number of samples drained.
    fn drain(&mut self, consumer: &mut SampleConsumer) -> usize {
        let mut total = 0;
        loop {
            let n = consumer.pop_slice(&mut self.scratch);
            if n == 0 {
                break;
            }
            total += n;

            let before = self.buffer.chunk_count();
            let completed = self.assembler.extend(&self.scratch[..n], &mut self.buffer);
            for index in before..before + completed {
                self.emit_activity(index);
            }
        }
        self.report_drops();
        total
    }

    fn emit_activity(&mut self, index: usize) {
        self.diagnostics
            .chunks_collected
            .fetch_add(1, Ordering::Relaxed);
        let chunk = &self.buffer.chunks()[index];
        // Every chunk before `index` is a full block.
        let collected = index * self.assembler.block_size() + chunk.len();
        let event = AudioActivityEvent {
            chunk_index: index as u64,
            rms: chunk.rms(),
            elapsed_secs: collected as f64 / self.sample_rate.get() as f64,
        };
        // No subscribers is fine.
        let _ = self.activity_tx.send(event);
    }

    fn report_drops(&mut self) {
        let dropped = self.diagnostics.samples_dropped.load(Ordering::Relaxed);
        if dropped > self.dropped_reported {
            warn!(
                dropped = dropped - self.dropped_reported,
                "sample ring full: collector fell behind the device"
            );
            self.dropped_reported = dropped;
        }
    }

    fn finish(mut self) -> ChunkBuffer {
        let before = self.buffer.chunk_count();
        if self.assembler.flush(&mut self.buffer) {
            self.emit_activity(before);
        }
        self.buffer
    }
}

/// Run the collector until `ctx.running` becomes false, then tear down and
/// return everything captured.
pub fn run(ctx: CollectorContext) -> ChunkBuffer {
    let CollectorContext {
        stream,
        mut consumer,
        running,
        block_size,
        sample_rate,
        diagnostics,
        activity_tx,
    } = ctx;

    info!(
        device = stream.device_name(),
        %sample_rate,
        block_size,
        "collector started"
    );

    let mut collector = Collector {
        assembler: ChunkAssembler::new(block_size),
        buffer: ChunkBuffer::new(),
        scratch: vec![0f32; DRAIN_CHUNK],
        sample_rate,
        diagnostics,
        activity_tx,
        dropped_reported: 0,
    };

    while running.load(Ordering::Acquire) {
        if collector.drain(&mut consumer) == 0 {
            std::thread::sleep(IDLE_SLEEP);
        }
    }

    // Releases the device; no callback is running once this returns.
    drop(stream);

    let tail = collector.drain(&mut consumer);
    debug!(tail_samples = tail, "drained ring after device release");

    let buffer = collector.finish();
    info!(
        chunks = buffer.chunk_count(),
        samples = buffer.total_samples(),
        "collector finished"
    );
    buffer
}
