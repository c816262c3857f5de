//! Audio capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread. It **must not**:
//! - Block on a mutex or condvar
//! - Perform I/O
//! - Allocate once the first block has been seen
//!
//! The callback down-mixes into a reused scratch vector and hands the block to
//! [`SampleSink::push`], which writes into a wait-free SPSC ring.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). [`CpalSource::open`] is therefore only ever called from the
//! session's capture thread, which also drops the stream.

pub mod device;
pub mod source;

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    FromSample, Sample, SampleFormat, SizedSample, StreamConfig,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info};

use crate::{
    buffering::chunk::DEFAULT_BLOCK_SIZE,
    error::{Result, VoxchatError},
};

pub use source::{CaptureDiagnostics, DiagnosticsSnapshot, InputSource, InputStream, SampleSink};

/// Default capture rate (Hz).
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

const DEFAULT_RATE: NonZeroU32 = match NonZeroU32::new(DEFAULT_SAMPLE_RATE) {
    Some(rate) => rate,
    None => panic!("default sample rate must be non-zero"),
};

/// A validated, non-zero sample rate in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SampleRate(NonZeroU32);

impl SampleRate {
    /// # Errors
    /// `VoxchatError::InvalidArgument` for a rate of zero.
    pub fn new(hz: u32) -> Result<Self> {
        NonZeroU32::new(hz)
            .map(Self)
            .ok_or_else(|| VoxchatError::InvalidArgument("sample rate must be positive".into()))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self(DEFAULT_RATE)
    }
}

impl TryFrom<u32> for SampleRate {
    type Error = VoxchatError;

    fn try_from(hz: u32) -> Result<Self> {
        Self::new(hz)
    }
}

impl From<SampleRate> for u32 {
    fn from(rate: SampleRate) -> u32 {
        rate.get()
    }
}

impl std::fmt::Display for SampleRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.get())
    }
}

/// Capture parameters, fixed for the lifetime of one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Device rate. Never converted: the device must support it directly.
    pub sample_rate: SampleRate,
    /// Samples per [`SampleChunk`](crate::buffering::SampleChunk). Default: 4096.
    pub block_size: usize,
    /// Input device name to prefer over the system default.
    pub preferred_device: Option<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            preferred_device: None,
        }
    }
}

/// Down-mix interleaved frames to mono f32 into `out`, replacing its contents.
///
/// `out` keeps its capacity between calls, so steady-state callbacks do not
/// allocate.
#[cfg(feature = "audio-cpal")]
pub fn downmix_into<T>(data: &[T], channels: usize, out: &mut Vec<f32>)
where
    T: Sample,
    f32: FromSample<T>,
{
    out.clear();
    let channels = channels.max(1);
    if channels == 1 {
        out.extend(data.iter().map(|&s| f32::from_sample(s)));
        return;
    }
    let scale = 1.0 / channels as f32;
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
        out.push(sum * scale);
    }
}

/// The system capture backend.
#[derive(Debug, Clone, Default)]
pub struct CpalSource;

impl CpalSource {
    pub fn new() -> Self {
        Self
    }
}

/// A live cpal stream plus the metadata reported when it was opened.
#[cfg(feature = "audio-cpal")]
struct CpalStream {
    /// Kept alive so the stream is not dropped prematurely.
    _stream: cpal::Stream,
    sample_rate: SampleRate,
    device_name: String,
}

#[cfg(feature = "audio-cpal")]
impl InputStream for CpalStream {
    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    fn device_name(&self) -> &str {
        &self.device_name
    }
}

#[cfg(feature = "audio-cpal")]
impl InputSource for CpalSource {
    fn open(&self, config: &CaptureConfig, sink: SampleSink) -> Result<Box<dyn InputStream>> {
        let host = cpal::default_host();
        let device = device::select_input_device(&host, config.preferred_device.as_deref())?;
        let device_name = device.name().unwrap_or_default();

        let supported = device::supported_config_at(&device, config.sample_rate)?;
        let channels = supported.channels();
        let sample_format = supported.sample_format();

        info!(
            device = device_name.as_str(),
            sample_rate = config.sample_rate.get(),
            channels,
            ?sample_format,
            "opening input device"
        );

        let stream_config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(config.sample_rate.get()),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &stream_config, sink),
            SampleFormat::I16 => build_stream::<i16>(&device, &stream_config, sink),
            SampleFormat::U16 => build_stream::<u16>(&device, &stream_config, sink),
            SampleFormat::I32 => build_stream::<i32>(&device, &stream_config, sink),
            fmt => {
                return Err(VoxchatError::DeviceUnavailable(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        // A failed play() drops `stream` on return, releasing the device.
        stream.play().map_err(|e| match e {
            cpal::PlayStreamError::DeviceNotAvailable => {
                VoxchatError::DeviceUnavailable(e.to_string())
            }
            other => VoxchatError::AudioStream(other.to_string()),
        })?;

        Ok(Box::new(CpalStream {
            _stream: stream,
            sample_rate: config.sample_rate,
            device_name,
        }))
    }
}

#[cfg(feature = "audio-cpal")]
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut sink: SampleSink,
) -> Result<cpal::Stream>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = config.channels as usize;
    let mut mono: Vec<f32> = Vec::with_capacity(DEFAULT_BLOCK_SIZE);
    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                downmix_into(data, channels, &mut mono);
                sink.push(&mono);
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| match e {
            cpal::BuildStreamError::InvalidArgument => VoxchatError::AudioStream(e.to_string()),
            other => VoxchatError::DeviceUnavailable(other.to_string()),
        })
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl InputSource for CpalSource {
    fn open(&self, _config: &CaptureConfig, _sink: SampleSink) -> Result<Box<dyn InputStream>> {
        Err(VoxchatError::DeviceUnavailable(
            "compiled without audio-cpal feature".into(),
        ))
    }
}
