//! Canonical PCM16 mono WAV encoding.
//!
//! ## Layout
//!
//! ```text
//! offset  size  field
//!      0     4  "RIFF"
//!      4     4  36 + data_len
//!      8     4  "WAVE"
//!     12     4  "fmt "
//!     16     4  16 (fmt chunk size)
//!     20     2  1  (PCM)
//!     22     2  1  (mono)
//!     24     4  sample rate
//!     28     4  byte rate = sample rate * 2
//!     32     2  block align = 2
//!     34     2  bits per sample = 16
//!     36     4  "data"
//!     40     4  data_len = sample count * 2
//!     44     …  little-endian i16 samples
//! ```

use crate::{
    audio::SampleRate,
    buffering::ChunkBuffer,
    error::{Result, VoxchatError},
};

/// Size of the canonical header preceding the PCM payload.
pub const WAV_HEADER_LEN: usize = 44;

/// MIME type attached to every [`EncodedAudio`].
pub const WAV_MIME: &str = "audio/wav";

/// File name used when the audio is submitted as a form part.
pub const WAV_FILE_NAME: &str = "audio.wav";

const CHANNELS: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BLOCK_ALIGN: u16 = CHANNELS * BITS_PER_SAMPLE / 8;

/// An immutable, fully encoded WAV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    bytes: Vec<u8>,
    sample_rate: SampleRate,
    sample_count: usize,
}

impl EncodedAudio {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Size of the whole file, header included. Never less than 44.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether any audio follows the header.
    pub fn has_samples(&self) -> bool {
        self.sample_count > 0
    }

    pub fn mime_type(&self) -> &'static str {
        WAV_MIME
    }

    pub fn file_name(&self) -> &'static str {
        WAV_FILE_NAME
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn duration_secs(&self) -> f64 {
        self.sample_count as f64 / self.sample_rate.get() as f64
    }
}

/// Convert one f32 sample to PCM16.
///
/// Negative values scale by 0x8000 and non-negative values by 0x7FFF, so both
/// ends of [-1.0, 1.0] land exactly on the i16 range. The cast truncates
/// toward zero; NaN becomes 0.
#[inline]
pub fn f32_to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode a chunk buffer as a mono PCM16 WAV file.
///
/// An empty buffer produces a valid header-only file. Output is a pure
/// function of the inputs.
///
/// # Errors
/// `VoxchatError::InvalidArgument` when the payload or byte rate does not fit
/// the 32-bit header fields.
pub fn encode(buffer: &ChunkBuffer, sample_rate: SampleRate) -> Result<EncodedAudio> {
    let sample_count = buffer.total_samples();
    let data_len = sample_count
        .checked_mul(BLOCK_ALIGN as usize)
        .and_then(|len| u32::try_from(len).ok())
        .filter(|len| len.checked_add(36).is_some())
        .ok_or_else(|| {
            VoxchatError::InvalidArgument(format!(
                "{sample_count} samples exceed the WAV size limit"
            ))
        })?;
    let byte_rate = sample_rate
        .get()
        .checked_mul(BLOCK_ALIGN as u32)
        .ok_or_else(|| {
            VoxchatError::InvalidArgument(format!(
                "sample rate {} overflows the WAV byte rate",
                sample_rate.get()
            ))
        })?;

    let mut bytes = Vec::with_capacity(WAV_HEADER_LEN + data_len as usize);

    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&CHANNELS.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.get().to_le_bytes());
    bytes.extend_from_slice(&byte_rate.to_le_bytes());
    bytes.extend_from_slice(&BLOCK_ALIGN.to_le_bytes());
    bytes.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for sample in buffer.samples() {
        bytes.extend_from_slice(&f32_to_pcm16(sample).to_le_bytes());
    }

    debug_assert_eq!(bytes.len(), WAV_HEADER_LEN + data_len as usize);

    Ok(EncodedAudio {
        bytes,
        sample_rate,
        sample_count,
    })
}
