//! Raw clip sidecar metadata
//!
//! A raw clip folder carries a `metadata.json` describing how it was
//! recorded, so it can be muxed later with the same parameters.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::error::RecorderResult;

/// File names inside a raw clip folder.
pub const METADATA_FILE: &str = "metadata.json";
pub const RAW_VIDEO_FILE: &str = "video.ts";
pub const RAW_AUDIO_FILE: &str = "audio.pcm";

/// Sidecar describing a raw clip folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipMetadata {
    /// Tail length to mux, in seconds.
    pub duration_sec: u32,

    /// Whether `audio.pcm` exists next to the video.
    pub has_audio: bool,

    /// When the clip was saved.
    pub created_at: DateTime<Utc>,
}

/// Write the sidecar into a clip folder.
pub fn write_metadata(clip_dir: &Path, metadata: &ClipMetadata) -> RecorderResult<()> {
    let content = serde_json::to_string_pretty(metadata)?;
    fs::write(clip_dir.join(METADATA_FILE), content)?;
    Ok(())
}

/// Read the sidecar from a clip folder.
pub fn read_metadata(clip_dir: &Path) -> RecorderResult<ClipMetadata> {
    let content = fs::read_to_string(clip_dir.join(METADATA_FILE))?;
    let metadata: ClipMetadata = serde_json::from_str(&content)?;
    Ok(metadata)
}
