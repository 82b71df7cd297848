//! Clip saving
//!
//! Turns a snapshot of the rolling window into a file on disk: either a
//! muxed `.mp4` or a raw clip folder (`video.ts` + optional `audio.pcm` +
//! `metadata.json`) that can be converted later.

pub mod metadata;
pub mod muxer;
pub mod saver;

pub use metadata::ClipMetadata;
pub use muxer::{FfmpegMuxer, MuxerLauncher};
pub use saver::{ClipSaver, SaveEvent, SaveOptions};
