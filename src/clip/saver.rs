//! Clip saver
//!
//! Snapshots the video and mixed-audio rings synchronously, then finishes
//! the save (file writes + mux) on a background thread so the capture
//! pipeline never stalls on disk or on the muxer. In-flight saves own
//! their temp files and run to completion even if recording stops.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use crate::buffer::{RingBuffer, StreamBuffer};
use crate::clip::metadata::{
    self, ClipMetadata, RAW_AUDIO_FILE, RAW_VIDEO_FILE,
};
use crate::clip::muxer::{convert_args, merge_args, MuxerLauncher};
use crate::utils::error::{RecorderError, RecorderResult};

/// Buffered writer size for the large snapshot files.
const WRITE_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// How one save should be produced.
#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// Clip name without extension, e.g. `clip_20260802_153000`.
    pub base_name: String,

    /// Mux into `.mp4`; otherwise write a raw clip folder.
    pub convert_to_mp4: bool,

    /// Delete the intermediate `.ts` after a successful mux.
    pub delete_intermediate: bool,

    /// Tail length in seconds the muxer should keep; 0 keeps everything.
    pub duration_sec: u32,
}

/// Outcome of a background save, delivered on the save worker's thread.
#[derive(Debug)]
pub enum SaveEvent {
    Completed { path: PathBuf },
    Failed { base_name: String, error: RecorderError },
}

type EventCallback = Arc<dyn Fn(SaveEvent) + Send + Sync>;

/// Produces saved clips from ring snapshots.
pub struct ClipSaver {
    output_dir: PathBuf,
    muxer: Arc<dyn MuxerLauncher>,
    in_flight: Arc<AtomicUsize>,
    on_event: Arc<Mutex<Option<EventCallback>>>,
}

impl ClipSaver {
    /// Create a saver writing into `output_dir`, creating it if needed.
    pub fn new(output_dir: impl Into<PathBuf>, muxer: Arc<dyn MuxerLauncher>) -> RecorderResult<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            muxer,
            in_flight: Arc::new(AtomicUsize::new(0)),
            on_event: Arc::new(Mutex::new(None)),
        })
    }

    /// Register a callback for background save outcomes.
    pub fn set_on_event(&self, callback: impl Fn(SaveEvent) + Send + Sync + 'static) {
        *self.on_event.lock() = Some(Arc::new(callback));
    }

    /// Number of saves currently running in the background.
    pub fn pending_saves(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Snapshot both rings and schedule the rest of the save.
    ///
    /// Returns the prospective output path (file for muxed saves, folder
    /// for raw ones) as soon as the snapshots are taken. An empty video
    /// ring fails with `EmptyBuffer`; empty audio degrades to video-only.
    pub fn save(
        &self,
        video_ring: &RingBuffer,
        mixed_ring: Option<&StreamBuffer>,
        options: SaveOptions,
    ) -> RecorderResult<PathBuf> {
        let video = video_ring.snapshot();
        if video.is_empty() {
            return Err(RecorderError::EmptyBuffer);
        }

        let audio = mixed_ring
            .map(|ring| ring.snapshot())
            .filter(|pcm| !pcm.is_empty());

        let output = if options.convert_to_mp4 {
            self.output_dir.join(format!("{}.mp4", options.base_name))
        } else {
            self.output_dir.join(&options.base_name)
        };

        tracing::info!(
            "saving clip {:?} ({} MB video, audio: {})",
            options.base_name,
            video.len() / (1024 * 1024),
            audio.is_some()
        );

        let output_dir = self.output_dir.clone();
        let muxer = self.muxer.clone();
        let on_event = self.on_event.clone();
        let in_flight = self.in_flight.clone();
        in_flight.fetch_add(1, Ordering::SeqCst);

        std::thread::spawn(move || {
            let base_name = options.base_name.clone();
            let result = process_save(&output_dir, muxer.as_ref(), video, audio, options);

            match &result {
                Ok(path) => tracing::info!("clip saved: {:?}", path),
                Err(e) => tracing::error!("failed to save clip {:?}: {}", base_name, e),
            }

            let callback = on_event.lock().clone();
            if let Some(callback) = callback {
                callback(match result {
                    Ok(path) => SaveEvent::Completed { path },
                    Err(error) => SaveEvent::Failed { base_name, error },
                });
            }

            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(output)
    }

    /// Mux a previously saved raw clip folder into an `.mp4` next to it,
    /// driven by its sidecar metadata. Deletes the folder on success when
    /// `delete_raw` is set.
    pub fn convert_raw_folder(&self, folder: &Path, delete_raw: bool) -> RecorderResult<PathBuf> {
        let meta = metadata::read_metadata(folder)?;

        let folder_name = folder
            .file_name()
            .ok_or_else(|| RecorderError::InvalidConfig(format!("not a clip folder: {folder:?}")))?
            .to_string_lossy()
            .into_owned();
        let mp4_path = self.output_dir.join(format!("{folder_name}.mp4"));
        let video_path = folder.join(RAW_VIDEO_FILE);

        let args = if meta.has_audio {
            merge_args(
                &video_path,
                &folder.join(RAW_AUDIO_FILE),
                &mp4_path,
                meta.duration_sec,
            )
        } else {
            convert_args(&video_path, &mp4_path, meta.duration_sec)
        };

        self.muxer.mux(&args)?;
        tracing::info!("raw clip folder converted: {:?} -> {:?}", folder, mp4_path);

        if delete_raw {
            if let Err(e) = std::fs::remove_dir_all(folder) {
                tracing::warn!("failed to delete raw clip folder {:?}: {}", folder, e);
            }
        }

        Ok(mp4_path)
    }
}

fn process_save(
    output_dir: &Path,
    muxer: &dyn MuxerLauncher,
    video: Vec<u8>,
    audio: Option<Vec<u8>>,
    options: SaveOptions,
) -> RecorderResult<PathBuf> {
    // Raw mode: a folder with the elementary streams and a sidecar.
    if !options.convert_to_mp4 {
        let clip_dir = output_dir.join(&options.base_name);
        std::fs::create_dir_all(&clip_dir)?;

        write_snapshot(&clip_dir.join(RAW_VIDEO_FILE), &video)?;
        drop(video);

        let has_audio = audio.is_some();
        if let Some(pcm) = audio {
            write_snapshot(&clip_dir.join(RAW_AUDIO_FILE), &pcm)?;
        }

        metadata::write_metadata(
            &clip_dir,
            &ClipMetadata {
                duration_sec: options.duration_sec,
                has_audio,
                created_at: Utc::now(),
            },
        )?;
        return Ok(clip_dir);
    }

    // Mux mode: temp files in, one muxer run, temp files out. The
    // snapshots can be hundreds of MB, so each is dropped the moment it
    // is on disk.
    let ts_path = output_dir.join(format!("{}.ts", options.base_name));
    write_snapshot(&ts_path, &video)?;
    drop(video);

    let pcm_path = match audio {
        Some(pcm) => {
            let path = output_dir.join(format!("{}.pcm", options.base_name));
            write_snapshot(&path, &pcm)?;
            Some(path)
        }
        None => None,
    };

    let mp4_path = output_dir.join(format!("{}.mp4", options.base_name));
    let args = match &pcm_path {
        Some(pcm) => merge_args(&ts_path, pcm, &mp4_path, options.duration_sec),
        None => convert_args(&ts_path, &mp4_path, options.duration_sec),
    };

    // On failure the temp files stay behind for post-mortem.
    muxer.mux(&args)?;

    if options.delete_intermediate {
        if let Err(e) = std::fs::remove_file(&ts_path) {
            tracing::warn!("failed to delete {:?}: {}", ts_path, e);
        }
    }
    if let Some(pcm) = pcm_path {
        if let Err(e) = std::fs::remove_file(&pcm) {
            tracing::warn!("failed to delete {:?}: {}", pcm, e);
        }
    }

    Ok(mp4_path)
}

fn write_snapshot(path: &Path, data: &[u8]) -> RecorderResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
    writer.write_all(data)?;
    writer.flush()?;
    Ok(())
}
