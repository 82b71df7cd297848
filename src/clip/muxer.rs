//! Muxer invocation
//!
//! Assembles ffmpeg argument vectors for turning window snapshots into
//! playable files and runs them through a [`MuxerLauncher`]. The encoded
//! video is stream-copied; raw PCM audio is typed explicitly and encoded
//! to AAC.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::capture::launcher::hidden_command;
use crate::utils::error::{RecorderError, RecorderResult};

/// Runs one muxer invocation synchronously.
pub trait MuxerLauncher: Send + Sync {
    /// Non-zero exit is reported as `MuxerFailed`.
    fn mux(&self, args: &[String]) -> RecorderResult<()>;
}

/// Production muxer: a synchronous ffmpeg run.
pub struct FfmpegMuxer {
    ffmpeg_path: PathBuf,
}

impl FfmpegMuxer {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl MuxerLauncher for FfmpegMuxer {
    fn mux(&self, args: &[String]) -> RecorderResult<()> {
        tracing::debug!("running muxer: {:?} {}", self.ffmpeg_path, args.join(" "));

        let output = hidden_command(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| RecorderError::SpawnFailed(format!("failed to start muxer: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("unknown error");
            return Err(RecorderError::MuxerFailed(format!(
                "exit {}: {}",
                output.status, detail
            )));
        }

        Ok(())
    }
}

/// Arguments for muxing a video snapshot together with raw PCM audio.
/// `duration_sec > 0` seeks that far back from the end of the video.
pub(crate) fn merge_args(
    video_path: &Path,
    pcm_path: &Path,
    mp4_path: &Path,
    duration_sec: u32,
) -> Vec<String> {
    let mut args = vec!["-y".to_string()];
    if duration_sec > 0 {
        args.extend(["-sseof".to_string(), format!("-{duration_sec}")]);
    }
    args.extend(["-i".to_string(), video_path.to_string_lossy().into_owned()]);
    args.extend(
        [
            "-f", "f32le", "-ar", "48000", "-ac", "2",
        ]
        .map(String::from),
    );
    args.extend(["-i".to_string(), pcm_path.to_string_lossy().into_owned()]);
    args.extend(
        [
            "-c:v", "copy", "-c:a", "aac", "-b:a", "192k", "-shortest",
        ]
        .map(String::from),
    );
    args.push(mp4_path.to_string_lossy().into_owned());
    args
}

/// Arguments for muxing a video-only snapshot (pure stream copy).
pub(crate) fn convert_args(video_path: &Path, mp4_path: &Path, duration_sec: u32) -> Vec<String> {
    let mut args = vec!["-y".to_string()];
    if duration_sec > 0 {
        args.extend(["-sseof".to_string(), format!("-{duration_sec}")]);
    }
    args.extend(["-i".to_string(), video_path.to_string_lossy().into_owned()]);
    args.extend(["-c".to_string(), "copy".to_string()]);
    args.push(mp4_path.to_string_lossy().into_owned());
    args
}
