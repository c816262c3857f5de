//! Events broadcast by a [`CaptureSession`](crate::session::CaptureSession).
//!
//! Hosts subscribe to these to drive a record button and a level meter; the
//! session itself never depends on who is listening.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No device held; `start()` is legal.
    Idle,
    /// Device open and samples flowing into the chunk buffer.
    Recording,
}

/// Emitted whenever the session changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    pub status: SessionStatus,
    /// Optional human-readable detail (device name, error message).
    pub detail: Option<String>,
}

/// Emitted once per collected chunk while recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioActivityEvent {
    /// Index of the chunk within the current recording.
    pub chunk_index: u64,
    /// Root-mean-square level of the chunk in [0.0, 1.0].
    pub rms: f32,
    /// Seconds of audio collected so far.
    pub elapsed_secs: f64,
}
