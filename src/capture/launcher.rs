//! Encoder process launcher
//!
//! The engine never synthesizes encoder command lines itself; it talks to a
//! [`VideoEncoderLauncher`] that spawns some process whose stdout delivers
//! the encoded stream. [`FfmpegEncoderLauncher`] is the production
//! implementation, wrapping ffmpeg's desktop duplication capture.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use crate::capture::plan::RecordingPlan;
use crate::utils::error::{RecorderError, RecorderResult};

/// Handle to a running encoder process.
pub trait EncoderProcess: Send {
    /// Take the encoded byte stream. Can only be taken once.
    fn take_output(&mut self) -> RecorderResult<Box<dyn Read + Send>>;

    /// Terminate the process. Must not block waiting for a graceful exit.
    fn kill(&mut self);

    /// Reap the process after termination.
    fn wait(&mut self);
}

/// Spawns the external video encoder for a recording plan.
pub trait VideoEncoderLauncher: Send + Sync {
    fn spawn(&self, plan: &RecordingPlan) -> RecorderResult<Box<dyn EncoderProcess>>;
}

/// Production launcher: ffmpeg capturing the desktop via `ddagrab` and
/// streaming MPEG-TS to stdout.
pub struct FfmpegEncoderLauncher {
    ffmpeg_path: PathBuf,
}

impl FfmpegEncoderLauncher {
    pub fn new(ffmpeg_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    fn build_args(plan: &RecordingPlan) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string()];

        // Desktop duplication input.
        args.extend([
            "-f".to_string(),
            "lavfi".to_string(),
            "-rtbufsize".to_string(),
            "100M".to_string(),
            "-i".to_string(),
            format!(
                "ddagrab=output_idx={}:framerate={}:draw_mouse={}",
                plan.display_index,
                plan.fps,
                if plan.draw_mouse { 1 } else { 0 }
            ),
        ]);

        // Encoder tokens come from the resolved plan; fall back to CPU
        // encoding when none were provided.
        if plan.encoder_args.is_empty() {
            args.extend(
                [
                    "-vf",
                    "hwdownload,format=bgra,format=nv12",
                    "-c:v",
                    "libx264",
                    "-preset",
                    "ultrafast",
                    "-tune",
                    "zerolatency",
                ]
                .map(String::from),
            );
        } else {
            args.extend(plan.encoder_args.iter().cloned());
        }

        args.extend([
            "-b:v".to_string(),
            plan.bitrate.clone(),
            "-maxrate".to_string(),
            plan.bitrate.clone(),
            "-bufsize".to_string(),
            plan.bitrate.clone(),
            "-g".to_string(),
            plan.fps.to_string(),
            "-f".to_string(),
            "mpegts".to_string(),
            "-".to_string(),
        ]);

        args
    }
}

impl VideoEncoderLauncher for FfmpegEncoderLauncher {
    fn spawn(&self, plan: &RecordingPlan) -> RecorderResult<Box<dyn EncoderProcess>> {
        let args = Self::build_args(plan);
        tracing::info!("starting encoder: {:?} {}", self.ffmpeg_path, args.join(" "));

        let child = hidden_command(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RecorderError::SpawnFailed(format!("failed to start encoder: {e}")))?;

        Ok(Box::new(FfmpegEncoderProcess { child }))
    }
}

struct FfmpegEncoderProcess {
    child: Child,
}

impl EncoderProcess for FfmpegEncoderProcess {
    fn take_output(&mut self) -> RecorderResult<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|s| Box::new(s) as Box<dyn Read + Send>)
            .ok_or_else(|| RecorderError::SpawnFailed("encoder stdout already taken".to_string()))
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
    }

    fn wait(&mut self) {
        let _ = self.child.wait();
    }
}

/// Build a `Command` that won't flash a console window on Windows.
pub(crate) fn hidden_command(program: impl AsRef<std::ffi::OsStr>) -> Command {
    #[allow(unused_mut)]
    let mut cmd = Command::new(program);
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}
