//! Recording plan
//!
//! The resolved configuration a recording runs with. Display and encoder
//! discovery happen upstream; the plan only carries what the encoder
//! launcher and the engine need: which display, how to encode, how much
//! history to keep and where clips go.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::error::{RecorderError, RecorderResult};

/// Resolved configuration for one recording session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingPlan {
    /// Display index as understood by the external encoder.
    pub display_index: u32,

    /// Opaque encoder argument tokens embedded into the encoder command.
    /// Empty means the launcher's CPU fallback.
    #[serde(default)]
    pub encoder_args: Vec<String>,

    /// Capture frame rate, 1-240.
    pub fps: u32,

    /// Target bitrate, e.g. "15M" or "800k".
    pub bitrate: String,

    /// Seconds of history kept in memory.
    pub window_seconds: u32,

    /// Microphone device id; None disables mic capture.
    #[serde(default)]
    pub mic_device_id: Option<String>,

    /// Playback device id to loopback-capture; None disables system audio.
    #[serde(default)]
    pub loopback_device_id: Option<String>,

    /// Microphone volume, 0-200 (100 = unity).
    pub mic_volume_percent: u32,

    /// Loopback volume, 0-200 (100 = unity).
    pub loopback_volume_percent: u32,

    /// Directory clips are written to.
    pub output_dir: PathBuf,

    /// Mux saved clips into .mp4 instead of writing a raw clip folder.
    pub convert_to_mp4: bool,

    /// Include the mouse cursor in the capture.
    pub draw_mouse: bool,
}

impl Default for RecordingPlan {
    fn default() -> Self {
        Self {
            display_index: 0,
            encoder_args: Vec::new(),
            fps: 60,
            bitrate: "15M".to_string(),
            window_seconds: 30,
            mic_device_id: None,
            loopback_device_id: None,
            mic_volume_percent: 100,
            loopback_volume_percent: 100,
            output_dir: PathBuf::from("./clips"),
            convert_to_mp4: true,
            draw_mouse: true,
        }
    }
}

impl RecordingPlan {
    /// Check the parts of the plan the engine can judge on its own.
    /// Display and encoder existence are the resolver's responsibility.
    pub fn validate(&self) -> RecorderResult<()> {
        if self.fps == 0 || self.fps > 240 {
            return Err(RecorderError::InvalidConfig(
                "fps must be between 1 and 240".to_string(),
            ));
        }
        if self.window_seconds == 0 {
            return Err(RecorderError::InvalidConfig(
                "window seconds must be positive".to_string(),
            ));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(RecorderError::InvalidConfig(
                "output directory must be set".to_string(),
            ));
        }
        parse_bitrate(&self.bitrate)?;
        Ok(())
    }

    /// Whether any audio source is configured.
    pub fn has_audio(&self) -> bool {
        self.mic_device_id.is_some() || self.loopback_device_id.is_some()
    }

    /// Target bitrate in bytes per second.
    pub fn bitrate_bytes_per_sec(&self) -> RecorderResult<u64> {
        Ok(parse_bitrate(&self.bitrate)? / 8)
    }

    /// Video ring size for this plan: the window at the target bitrate with
    /// 50% headroom, since encoders overshoot around scene changes.
    pub fn video_buffer_bytes(&self) -> RecorderResult<usize> {
        let per_sec = self.bitrate_bytes_per_sec()?;
        let window = per_sec * self.window_seconds as u64;
        Ok((window as f64 * 1.5).ceil() as usize)
    }

    /// Rough memory estimate for a bitrate/window pair, for UI previews.
    pub fn estimate_buffer_bytes(bitrate: &str, window_seconds: u32) -> RecorderResult<usize> {
        let plan = RecordingPlan {
            bitrate: bitrate.to_string(),
            window_seconds,
            ..Default::default()
        };
        plan.video_buffer_bytes()
    }
}

/// Parse a bitrate string like "15M", "800k" or "2500000" into bits/sec.
/// Suffixes are case-insensitive; `m` means x1_000_000 and `k` x1_000.
pub fn parse_bitrate(bitrate: &str) -> RecorderResult<u64> {
    let s = bitrate.trim().to_ascii_lowercase();
    let (digits, multiplier) = match s.strip_suffix('m') {
        Some(d) => (d, 1_000_000),
        None => match s.strip_suffix('k') {
            Some(d) => (d, 1_000),
            None => (s.as_str(), 1),
        },
    };

    let value: u64 = digits
        .parse()
        .map_err(|_| RecorderError::InvalidConfig(format!("invalid bitrate: {bitrate:?}")))?;
    if value == 0 {
        return Err(RecorderError::InvalidConfig(format!(
            "bitrate must be positive: {bitrate:?}"
        )));
    }

    Ok(value * multiplier)
}
