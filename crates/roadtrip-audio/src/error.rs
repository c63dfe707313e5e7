//! Error types for the road trip audio system

use crate::stream::StreamId;
use thiserror::Error;

/// Result type alias for audio operations
pub type AudioResult<T> = Result<T, AudioError>;

/// Errors that can occur in the audio orchestration system
#[derive(Error, Debug)]
pub enum AudioError {
    /// The sound behind a stream has already been released.
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Volume outside [0, 1] in static configuration. Runtime volumes are clamped instead.
    #[error("Invalid volume {value} for {field}")]
    InvalidVolume { field: String, value: f32 },

    #[error("Audio playback error: {0}")]
    Playback(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Audio runtime is not running")]
    RuntimeClosed,
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for AudioError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        AudioError::RuntimeClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for AudioError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        AudioError::RuntimeClosed
    }
}

impl From<reqwest::Error> for AudioError {
    fn from(err: reqwest::Error) -> Self {
        AudioError::Tts(err.to_string())
    }
}
