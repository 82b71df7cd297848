//! Video capture pipeline
//!
//! The recording plan, the encoder launcher seam, and the pump that moves
//! the external encoder's output into the rolling video ring.

pub mod launcher;
pub mod plan;
pub mod video;

pub use launcher::{EncoderProcess, FfmpegEncoderLauncher, VideoEncoderLauncher};
pub use plan::{parse_bitrate, RecordingPlan};
pub use video::VideoCapture;
