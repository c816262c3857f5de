//! # voxchat-core
//!
//! Microphone capture and WAV encoding for the voxchat client.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → InputSource callback → SampleSink (SPSC ring)
//!                                          │
//!                              collector thread (ChunkAssembler)
//!                                          │
//!                                 ChunkBuffer of SampleChunks
//!                                          │  stop()
//!                                      Recording
//!                                          │  encode()
//!                                 EncodedAudio (audio/wav)
//! ```
//!
//! The device callback never locks and never allocates after its first block.
//! Chunking, level metering and encoding all happen off the audio thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod error;
pub mod events;
pub mod session;
pub mod wav;

// Convenience re-exports for downstream crates
pub use audio::{CaptureConfig, CpalSource, InputSource, InputStream, SampleRate, SampleSink};
pub use buffering::{ChunkBuffer, SampleChunk};
pub use error::VoxchatError;
pub use events::{AudioActivityEvent, SessionStatus, SessionStatusEvent};
pub use session::{CaptureSession, Recording};
pub use wav::{encode, EncodedAudio};
