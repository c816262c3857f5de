use thiserror::Error;

/// All errors produced by voxchat-core.
#[derive(Debug, Error)]
pub enum VoxchatError {
    /// Permission denied, no input device, or the device rejected the
    /// requested configuration.
    #[error("audio input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, VoxchatError>;
