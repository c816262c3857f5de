//! Sample buffering between the device callback and the collector thread.
//!
//! The callback side writes into a `ringbuf::HeapRb<f32>` producer whose
//! `push_slice` is wait-free. The collector side drains the consumer and
//! re-blocks samples into fixed-size [`SampleChunk`]s owned by a
//! [`ChunkBuffer`].

pub mod chunk;

use ringbuf::{traits::Split, HeapRb};

pub use chunk::{ChunkAssembler, ChunkBuffer, SampleChunk};
pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, held by the device callback.
pub type SampleProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the collector thread.
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Ring capacity: 2^20 = 1 048 576 samples, about 65 s at 16 kHz.
/// The collector drains every few milliseconds, so this only fills if the
/// collector thread is starved for a very long time.
pub const RING_CAPACITY: usize = 1 << 20;

/// Create a matched producer/consumer pair backed by a fresh heap ring.
pub fn create_sample_ring() -> (SampleProducer, SampleConsumer) {
    create_sample_ring_with_capacity(RING_CAPACITY)
}

/// Same as [`create_sample_ring`] with an explicit capacity (in samples).
pub fn create_sample_ring_with_capacity(capacity: usize) -> (SampleProducer, SampleConsumer) {
    HeapRb::<f32>::new(capacity.max(1)).split()
}
