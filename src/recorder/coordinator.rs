//! Recorder façade
//!
//! Owns the lifecycle of the capture pipeline: the rolling rings, the video
//! pump, the audio streams and mixer, and the clip saver. All state
//! transitions serialize on one lock; state reads take a shared lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use parking_lot::{Mutex, RwLock};

use crate::audio::{
    gain_from_percent, mixed_buffer_bytes, stream_buffer_bytes, AudioMixer, AudioRole,
    AudioStream, MixerInput,
};
use crate::buffer::{RingBuffer, StreamBuffer};
use crate::capture::{RecordingPlan, VideoCapture, VideoEncoderLauncher};
use crate::clip::{ClipSaver, MuxerLauncher, SaveEvent, SaveOptions};
use crate::recorder::state::{RecorderState, RecorderStatus};
use crate::utils::error::{RecorderError, RecorderResult};

/// Minimum interval between successful saves.
const SAVE_DEBOUNCE: Duration = Duration::from_secs(3);

type ClipSavedCallback = Arc<dyn Fn(&str) + Send + Sync>;
type SaveEventCallback = Arc<dyn Fn(SaveEvent) + Send + Sync>;

struct Inner {
    plan: RecordingPlan,
    recording: bool,
    video_ring: Option<Arc<RingBuffer>>,
    mixed_ring: Option<Arc<StreamBuffer>>,
    capture: Option<VideoCapture>,
    streams: Vec<AudioStream>,
    mixer: Option<AudioMixer>,
    saver: Option<Arc<ClipSaver>>,
    started_at: Option<Instant>,
    last_save: Option<Instant>,
}

/// The instant-replay engine.
///
/// Construct once with the process launchers, `configure` a plan while
/// idle, then drive it with `start` / `save_clip` / `stop`.
pub struct Recorder {
    launcher: Arc<dyn VideoEncoderLauncher>,
    muxer: Arc<dyn MuxerLauncher>,
    inner: RwLock<Inner>,
    /// Last fatal pump error; cleared by stop().
    pump_error: Arc<Mutex<Option<String>>>,
    on_clip_saved: Mutex<Option<ClipSavedCallback>>,
    on_save_event: Arc<Mutex<Option<SaveEventCallback>>>,
}

impl Recorder {
    pub fn new(launcher: Arc<dyn VideoEncoderLauncher>, muxer: Arc<dyn MuxerLauncher>) -> Self {
        Self {
            launcher,
            muxer,
            inner: RwLock::new(Inner {
                plan: RecordingPlan::default(),
                recording: false,
                video_ring: None,
                mixed_ring: None,
                capture: None,
                streams: Vec::new(),
                mixer: None,
                saver: None,
                started_at: None,
                last_save: None,
            }),
            pump_error: Arc::new(Mutex::new(None)),
            on_clip_saved: Mutex::new(None),
            on_save_event: Arc::new(Mutex::new(None)),
        }
    }

    /// Fired with the prospective clip name right after a save is accepted.
    pub fn set_on_clip_saved(&self, callback: impl Fn(&str) + Send + Sync + 'static) {
        *self.on_clip_saved.lock() = Some(Arc::new(callback));
    }

    /// Fired from the save worker once a background save completes or fails.
    pub fn set_on_save_event(&self, callback: impl Fn(SaveEvent) + Send + Sync + 'static) {
        *self.on_save_event.lock() = Some(Arc::new(callback));
    }

    /// Replace the recording plan. Only valid while idle.
    pub fn configure(&self, plan: RecordingPlan) -> RecorderResult<()> {
        let mut inner = self.inner.write();
        if inner.recording {
            return Err(RecorderError::AlreadyRecording);
        }
        plan.validate()?;
        tracing::info!(
            "configured: display {}, {} fps, {}, {}s window",
            plan.display_index,
            plan.fps,
            plan.bitrate,
            plan.window_seconds
        );
        inner.plan = plan;
        Ok(())
    }

    /// The current plan.
    pub fn plan(&self) -> RecordingPlan {
        self.inner.read().plan.clone()
    }

    /// Start the rolling capture.
    ///
    /// Builds the rings, spawns the encoder and (if configured) the audio
    /// pipeline. Tears everything partially started back down on failure.
    pub fn start(&self) -> RecorderResult<()> {
        let mut inner = self.inner.write();
        if inner.recording {
            return Err(RecorderError::AlreadyRecording);
        }

        let plan = inner.plan.clone();
        plan.validate()?;

        let video_ring = Arc::new(RingBuffer::new(plan.video_buffer_bytes()?));
        let saver = Arc::new(ClipSaver::new(&plan.output_dir, self.muxer.clone())?);
        let forward = self.on_save_event.clone();
        saver.set_on_event(move |event| {
            let callback = forward.lock().clone();
            if let Some(callback) = callback {
                callback(event);
            }
        });

        let capture = VideoCapture::new(plan.clone(), self.launcher.clone(), video_ring.clone());
        let pump_error = self.pump_error.clone();
        capture.set_on_error(move |e| {
            *pump_error.lock() = Some(e.to_string());
        });
        capture.start()?;

        let mut streams: Vec<AudioStream> = Vec::new();
        let mut mixer = None;
        let mut mixed_ring = None;
        if plan.has_audio() {
            let mut sources = Vec::new();
            if let Some(id) = &plan.mic_device_id {
                sources.push((id.clone(), AudioRole::Input, plan.mic_volume_percent));
            }
            if let Some(id) = &plan.loopback_device_id {
                sources.push((id.clone(), AudioRole::Loopback, plan.loopback_volume_percent));
            }

            let mut inputs = Vec::new();
            for (device_id, role, volume) in sources {
                let ring = Arc::new(StreamBuffer::new(stream_buffer_bytes()));
                let stream = AudioStream::new(device_id.clone(), role, ring.clone());
                match stream.start() {
                    Ok(()) => {
                        inputs.push(MixerInput {
                            ring,
                            gain: gain_from_percent(volume),
                        });
                        streams.push(stream);
                    }
                    // A missing device degrades to silence from that
                    // source rather than failing the whole recording.
                    Err(e) => tracing::warn!("skipping audio device {:?}: {}", device_id, e),
                }
            }

            if streams.is_empty() {
                let _ = capture.stop();
                return Err(RecorderError::SpawnFailed(
                    "failed to start any audio stream".to_string(),
                ));
            }

            let ring = Arc::new(StreamBuffer::new(mixed_buffer_bytes(plan.window_seconds)));
            let mix = AudioMixer::new(inputs, ring.clone());
            if let Err(e) = mix.start() {
                for stream in &streams {
                    let _ = stream.stop();
                }
                let _ = capture.stop();
                return Err(e);
            }
            mixer = Some(mix);
            mixed_ring = Some(ring);
        }

        *self.pump_error.lock() = None;
        inner.video_ring = Some(video_ring);
        inner.mixed_ring = mixed_ring;
        inner.capture = Some(capture);
        inner.streams = streams;
        inner.mixer = mixer;
        inner.saver = Some(saver);
        inner.started_at = Some(Instant::now());
        inner.last_save = None;
        inner.recording = true;

        tracing::info!(
            "recording started ({}s window, audio streams: {})",
            inner.plan.window_seconds,
            inner.streams.len()
        );
        Ok(())
    }

    /// Stop the capture and release the window.
    ///
    /// Joins every worker and drops the rings immediately - the rolling
    /// window can be hundreds of MB. In-flight saves finish on their own.
    pub fn stop(&self) -> RecorderResult<()> {
        let mut inner = self.inner.write();
        if !inner.recording {
            return Err(RecorderError::NotRecording);
        }

        if let Some(capture) = inner.capture.take() {
            capture.stop()?;
        }
        if let Some(mixer) = inner.mixer.take() {
            mixer.stop()?;
        }
        for stream in inner.streams.drain(..) {
            stream.stop()?;
        }

        inner.video_ring = None;
        inner.mixed_ring = None;
        inner.saver = None;
        inner.started_at = None;
        inner.recording = false;
        *self.pump_error.lock() = None;

        tracing::info!("recording stopped");
        Ok(())
    }

    /// Save the current window as a clip.
    ///
    /// Snapshots the rings and returns the prospective clip name (a file
    /// for muxed saves, a folder for raw ones); muxing finishes in the
    /// background. Successful saves are debounced.
    pub fn save_clip(&self) -> RecorderResult<String> {
        let clip_name;
        {
            let mut inner = self.inner.write();
            if !inner.recording {
                return Err(RecorderError::NotRecording);
            }
            if let Some(last) = inner.last_save {
                if last.elapsed() < SAVE_DEBOUNCE {
                    return Err(RecorderError::SaveTooSoon);
                }
            }

            let plan = inner.plan.clone();
            let base_name = format!("clip_{}", Local::now().format("%Y%m%d_%H%M%S"));
            let options = SaveOptions {
                base_name: base_name.clone(),
                convert_to_mp4: plan.convert_to_mp4,
                // Keep the .ts only when it wasn't muxed into anything.
                delete_intermediate: plan.convert_to_mp4,
                duration_sec: plan.window_seconds,
            };

            let saver = inner
                .saver
                .as_ref()
                .ok_or(RecorderError::NotRecording)?
                .clone();
            let video_ring = inner
                .video_ring
                .as_ref()
                .ok_or(RecorderError::NotRecording)?
                .clone();
            let mixed_ring = inner.mixed_ring.clone();

            saver.save(&video_ring, mixed_ring.as_deref(), options)?;
            inner.last_save = Some(Instant::now());

            clip_name = if plan.convert_to_mp4 {
                format!("{base_name}.mp4")
            } else {
                base_name
            };
        }

        tracing::info!("clip save scheduled: {}", clip_name);
        let callback = self.on_clip_saved.lock().clone();
        if let Some(callback) = callback {
            callback(&clip_name);
        }
        Ok(clip_name)
    }

    /// Mux a previously saved raw clip folder, deleting it on success when
    /// `delete_raw` is set. Valid in any state.
    pub fn convert_raw_clip(&self, folder: &Path, delete_raw: bool) -> RecorderResult<PathBuf> {
        let output_dir = self.inner.read().plan.output_dir.clone();
        let saver = ClipSaver::new(output_dir, self.muxer.clone())?;
        saver.convert_raw_folder(folder, delete_raw)
    }

    /// Current externally visible state.
    pub fn state(&self) -> RecorderState {
        let inner = self.inner.read();
        let mut state = RecorderState::default();
        if !inner.recording {
            return state;
        }

        let pump_error = self.pump_error.lock().clone();
        let saving = inner
            .saver
            .as_ref()
            .map(|s| s.pending_saves() > 0)
            .unwrap_or(false);
        state.status = match pump_error {
            Some(message) => {
                state.error_message = Some(message);
                RecorderStatus::Error
            }
            None if saving => RecorderStatus::Saving,
            None => RecorderStatus::Recording,
        };

        if let Some(ring) = &inner.video_ring {
            state.buffer_usage = (ring.len() * 100 / ring.capacity()) as u32;
        }
        if let Some(started_at) = inner.started_at {
            state.recording_for = started_at.elapsed().as_secs();
        }
        state
    }

    pub fn is_recording(&self) -> bool {
        self.inner.read().recording
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::launcher::EncoderProcess;
    use std::io::{self, Read};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Fake encoder: streams zeros until killed; optional byte limit.
    struct FakeEncoder {
        limit: Option<usize>,
    }

    struct FakeProcess {
        stream: Option<FakeStream>,
        alive: Arc<AtomicBool>,
    }

    struct FakeStream {
        produced: usize,
        limit: Option<usize>,
        alive: Arc<AtomicBool>,
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.alive.load(Ordering::SeqCst) {
                return Ok(0);
            }
            if let Some(limit) = self.limit {
                if self.produced >= limit {
                    return Ok(0);
                }
            }
            let n = buf.len().min(8192);
            buf[..n].iter_mut().for_each(|b| *b = 0);
            self.produced += n;
            // Pace the fake encoder so tests exercise a live stream.
            std::thread::sleep(Duration::from_millis(1));
            Ok(n)
        }
    }

    impl VideoEncoderLauncher for FakeEncoder {
        fn spawn(&self, _plan: &RecordingPlan) -> RecorderResult<Box<dyn EncoderProcess>> {
            let alive = Arc::new(AtomicBool::new(true));
            Ok(Box::new(FakeProcess {
                stream: Some(FakeStream {
                    produced: 0,
                    limit: self.limit,
                    alive: alive.clone(),
                }),
                alive,
            }))
        }
    }

    impl EncoderProcess for FakeProcess {
        fn take_output(&mut self) -> RecorderResult<Box<dyn Read + Send>> {
            self.stream
                .take()
                .map(|s| Box::new(s) as Box<dyn Read + Send>)
                .ok_or_else(|| RecorderError::SpawnFailed("stream taken".into()))
        }

        fn kill(&mut self) {
            self.alive.store(false, Ordering::SeqCst);
        }

        fn wait(&mut self) {}
    }

    struct FailingEncoder;

    impl VideoEncoderLauncher for FailingEncoder {
        fn spawn(&self, _plan: &RecordingPlan) -> RecorderResult<Box<dyn EncoderProcess>> {
            Err(RecorderError::SpawnFailed("no encoder".to_string()))
        }
    }

    struct FakeMuxer {
        calls: AtomicUsize,
    }

    impl MuxerLauncher for FakeMuxer {
        fn mux(&self, args: &[String]) -> RecorderResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(out) = args.last() {
                std::fs::write(out, b"mp4").unwrap();
            }
            Ok(())
        }
    }

    fn test_recorder(limit: Option<usize>, output_dir: &Path) -> Recorder {
        let recorder = Recorder::new(
            Arc::new(FakeEncoder { limit }),
            Arc::new(FakeMuxer {
                calls: AtomicUsize::new(0),
            }),
        );
        recorder
            .configure(RecordingPlan {
                bitrate: "1M".to_string(),
                window_seconds: 2,
                output_dir: output_dir.to_path_buf(),
                ..Default::default()
            })
            .unwrap();
        recorder
    }

    fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn start_save_stop_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = test_recorder(None, dir.path());

        assert_eq!(recorder.state().status, RecorderStatus::Idle);

        recorder.start().unwrap();
        assert!(recorder.is_recording());
        assert!(matches!(
            recorder.start(),
            Err(RecorderError::AlreadyRecording)
        ));

        // Wait for the pump to land some bytes, then save.
        assert!(wait_until(Duration::from_secs(2), || {
            recorder.state().buffer_usage > 0
        }));
        let name = recorder.save_clip().unwrap();
        assert!(name.starts_with("clip_") && name.ends_with(".mp4"));

        let stopped_at = Instant::now();
        recorder.stop().unwrap();
        assert!(stopped_at.elapsed() < Duration::from_secs(1));
        assert_eq!(recorder.state().status, RecorderStatus::Idle);
        assert!(matches!(recorder.stop(), Err(RecorderError::NotRecording)));
    }

    #[test]
    fn save_requires_recording() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = test_recorder(None, dir.path());
        assert!(matches!(
            recorder.save_clip(),
            Err(RecorderError::NotRecording)
        ));
    }

    #[test]
    fn save_before_any_bytes_reports_empty_buffer() {
        let dir = tempfile::tempdir().unwrap();
        // Encoder that produces nothing at all.
        let recorder = test_recorder(Some(0), dir.path());

        recorder.start().unwrap();
        assert!(matches!(
            recorder.save_clip(),
            Err(RecorderError::EmptyBuffer)
        ));
        recorder.stop().unwrap();
    }

    #[test]
    fn successful_saves_are_debounced() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = test_recorder(None, dir.path());

        recorder.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            recorder.state().buffer_usage > 0
        }));

        recorder.save_clip().unwrap();
        assert!(matches!(
            recorder.save_clip(),
            Err(RecorderError::SaveTooSoon)
        ));
        recorder.stop().unwrap();
    }

    #[test]
    fn failed_save_does_not_arm_the_debounce() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = test_recorder(Some(0), dir.path());

        recorder.start().unwrap();
        assert!(matches!(
            recorder.save_clip(),
            Err(RecorderError::EmptyBuffer)
        ));
        // Still EmptyBuffer, not SaveTooSoon: the failure armed nothing.
        assert!(matches!(
            recorder.save_clip(),
            Err(RecorderError::EmptyBuffer)
        ));
        recorder.stop().unwrap();
    }

    #[test]
    fn configure_rejected_while_recording() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = test_recorder(None, dir.path());

        recorder.start().unwrap();
        assert!(matches!(
            recorder.configure(RecordingPlan::default()),
            Err(RecorderError::AlreadyRecording)
        ));
        recorder.stop().unwrap();
    }

    #[test]
    fn invalid_plan_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = test_recorder(None, dir.path());
        let result = recorder.configure(RecordingPlan {
            fps: 500,
            ..Default::default()
        });
        assert!(matches!(result, Err(RecorderError::InvalidConfig(_))));
    }

    #[test]
    fn spawn_failure_leaves_recorder_idle() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::new(
            Arc::new(FailingEncoder),
            Arc::new(FakeMuxer {
                calls: AtomicUsize::new(0),
            }),
        );
        recorder
            .configure(RecordingPlan {
                output_dir: dir.path().to_path_buf(),
                ..Default::default()
            })
            .unwrap();

        assert!(matches!(
            recorder.start(),
            Err(RecorderError::SpawnFailed(_))
        ));
        assert!(!recorder.is_recording());
        assert_eq!(recorder.state().status, RecorderStatus::Idle);
    }

    #[test]
    fn on_clip_saved_fires_with_prospective_name() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = test_recorder(None, dir.path());

        let saved = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = saved.clone();
        recorder.set_on_clip_saved(move |name| sink.lock().push(name.to_string()));

        recorder.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            recorder.state().buffer_usage > 0
        }));
        let name = recorder.save_clip().unwrap();
        recorder.stop().unwrap();

        let saved = saved.lock();
        assert_eq!(saved.as_slice(), [name]);
    }

    #[test]
    fn state_reports_usage_and_elapsed_time() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = test_recorder(None, dir.path());

        recorder.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            recorder.state().buffer_usage > 0
        }));
        let state = recorder.state();
        assert_eq!(state.status, RecorderStatus::Recording);
        assert!(state.buffer_usage <= 100);

        recorder.stop().unwrap();
        let state = recorder.state();
        assert_eq!(state.status, RecorderStatus::Idle);
        assert_eq!(state.buffer_usage, 0);
        assert_eq!(state.recording_for, 0);
    }
}
