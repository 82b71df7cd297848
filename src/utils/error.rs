//! Error types and handling
//!
//! Common error types used across the engine.

use thiserror::Error;

/// Engine-wide error type
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("already recording")]
    AlreadyRecording,

    #[error("not recording")]
    NotRecording,

    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("buffer is empty")]
    EmptyBuffer,

    #[error("please wait before saving another clip")]
    SaveTooSoon,

    #[error("muxer failed: {0}")]
    MuxerFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using RecorderError
pub type RecorderResult<T> = Result<T, RecorderError>;
