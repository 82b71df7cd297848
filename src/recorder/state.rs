//! Recorder state reporting
//!
//! The externally visible state of the engine, shaped for direct
//! serialization to a front-end.

use serde::{Deserialize, Serialize};

/// Current status of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderStatus {
    /// No recording in progress
    Idle,
    /// Rolling window is being captured
    Recording,
    /// A save is in flight (the window keeps rolling)
    Saving,
    /// The capture pipeline reported a fatal error
    Error,
}

impl Default for RecorderStatus {
    fn default() -> Self {
        Self::Idle
    }
}

/// Snapshot of the engine's externally visible state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecorderState {
    pub status: RecorderStatus,

    /// Set when status is Error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Video ring fill level, 0-100
    pub buffer_usage: u32,

    /// Seconds since recording started
    pub recording_for: u64,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self {
            status: RecorderStatus::Idle,
            error_message: None,
            buffer_usage: 0,
            recording_for: 0,
        }
    }
}
