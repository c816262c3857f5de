//! Chunk types accumulated by the collector thread during a recording.

/// Samples per chunk delivered to the [`ChunkBuffer`] while recording.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// One immutable block of mono f32 samples in [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct SampleChunk {
    samples: Box<[f32]>,
}

impl SampleChunk {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Root-mean-square level of the chunk.
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum_sq / self.samples.len() as f32).sqrt()
    }
}

impl From<Vec<f32>> for SampleChunk {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}

/// Append-only, capture-ordered list of chunks for one recording.
///
/// Each chunk owns its own allocation, so growth never copies audio that has
/// already been collected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkBuffer {
    chunks: Vec<SampleChunk>,
    total_samples: usize,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Empty chunks are ignored.
    pub fn push(&mut self, chunk: SampleChunk) {
        if chunk.is_empty() {
            return;
        }
        self.total_samples += chunk.len();
        self.chunks.push(chunk);
    }

    pub fn chunks(&self) -> &[SampleChunk] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Sum of all chunk lengths.
    pub fn total_samples(&self) -> usize {
        self.total_samples
    }

    pub fn is_empty(&self) -> bool {
        self.total_samples == 0
    }

    /// All samples in arrival order, across chunk boundaries.
    pub fn samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.chunks.iter().flat_map(|c| c.samples().iter().copied())
    }

    /// Copy every sample into one contiguous vector.
    pub fn flatten(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.total_samples);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk.samples());
        }
        out
    }
}

impl FromIterator<SampleChunk> for ChunkBuffer {
    fn from_iter<I: IntoIterator<Item = SampleChunk>>(iter: I) -> Self {
        let mut buffer = ChunkBuffer::new();
        for chunk in iter {
            buffer.push(chunk);
        }
        buffer
    }
}

/// Re-blocks a stream of arbitrarily sized sample slices into fixed-size
/// [`SampleChunk`]s.
///
/// Runs on the collector thread, never on the device callback.
#[derive(Debug)]
pub struct ChunkAssembler {
    block_size: usize,
    pending: Vec<f32>,
}

impl ChunkAssembler {
    pub fn new(block_size: usize) -> Self {
        let block_size = block_size.max(1);
        Self {
            block_size,
            pending: Vec::with_capacity(block_size),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Samples waiting for a full block.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed samples; every completed block is appended to `out`.
    /// Returns the number of chunks completed.
    pub fn extend(&mut self, mut samples: &[f32], out: &mut ChunkBuffer) -> usize {
        let mut completed = 0;
        while !samples.is_empty() {
            let room = self.block_size - self.pending.len();
            let take = room.min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.pending.len() == self.block_size {
                let full = std::mem::replace(&mut self.pending, Vec::with_capacity(self.block_size));
                out.push(SampleChunk::new(full));
                completed += 1;
            }
        }
        completed
    }

    /// Emit the remaining partial block, if any.
    pub fn flush(&mut self, out: &mut ChunkBuffer) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let tail = std::mem::take(&mut self.pending);
        out.push(SampleChunk::new(tail));
        true
    }
}
