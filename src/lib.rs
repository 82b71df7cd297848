//! Open Replay - instant replay for your desktop.
//!
//! Continuously captures the last N seconds of the screen (and optionally
//! microphone + system audio) into bounded in-memory rings, and saves that
//! window to disk on demand. Nothing is written to storage until the user
//! asks for a clip.
//!
//! The engine is headless: display/encoder discovery and any UI live in the
//! embedding application, which hands over a resolved [`RecordingPlan`] and
//! the process launchers.

pub mod audio;
pub mod buffer;
pub mod capture;
pub mod clip;
pub mod recorder;
pub mod utils;

pub use buffer::{RingBuffer, StreamBuffer};
pub use capture::{FfmpegEncoderLauncher, RecordingPlan, VideoCapture, VideoEncoderLauncher};
pub use clip::{ClipSaver, FfmpegMuxer, MuxerLauncher, SaveEvent, SaveOptions};
pub use recorder::{Recorder, RecorderState, RecorderStatus};
pub use utils::error::{RecorderError, RecorderResult};
