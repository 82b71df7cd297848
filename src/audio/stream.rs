//! Per-device audio capture
//!
//! One `AudioStream` wraps one cpal capture stream delivering canonical PCM
//! (48 kHz stereo f32) into a per-stream ring. System audio is captured by
//! building an input stream on a *playback* device, which WASAPI exposes as
//! loopback of whatever that device is rendering.
//!
//! The cpal stream lives on its own thread because streams are not `Send`;
//! the data callback only serializes samples into a reusable scratch and
//! appends to the ring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use parking_lot::Mutex;

use crate::audio::{CHANNELS, SAMPLE_RATE};
use crate::buffer::StreamBuffer;
use crate::utils::error::{RecorderError, RecorderResult};

/// What kind of endpoint a stream captures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioRole {
    /// A true capture device (microphone).
    Input,
    /// Loopback of a playback device (system audio).
    Loopback,
}

/// Captures one device into its stream ring for one recording session.
pub struct AudioStream {
    device_id: String,
    role: AudioRole,
    ring: Arc<StreamBuffer>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AudioStream {
    /// `device_id` is the cpal device name; empty selects the default
    /// device for the role.
    pub fn new(device_id: impl Into<String>, role: AudioRole, ring: Arc<StreamBuffer>) -> Self {
        Self {
            device_id: device_id.into(),
            role,
            ring,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Start delivering device callbacks into the ring.
    pub fn start(&self) -> RecorderResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RecorderError::AlreadyRecording);
        }

        let device_id = self.device_id.clone();
        let role = self.role;
        let ring = self.ring.clone();
        let running = self.running.clone();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<String, String>>();

        let handle = std::thread::spawn(move || {
            run_stream(&device_id, role, ring, &running, &ready_tx);
        });
        *self.worker.lock() = Some(handle);

        // The stream is built on the worker thread; wait for it to come up
        // so callers learn about unresolvable devices synchronously.
        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(name)) => {
                tracing::info!("audio stream started: {} ({:?})", name, self.role);
                Ok(())
            }
            Ok(Err(message)) => {
                self.join_worker();
                Err(RecorderError::SpawnFailed(message))
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                self.join_worker();
                Err(RecorderError::SpawnFailed(
                    "audio stream did not start in time".to_string(),
                ))
            }
        }
    }

    /// Stop callbacks and release the device. Idempotent.
    pub fn stop(&self) -> RecorderResult<()> {
        self.running.store(false, Ordering::SeqCst);
        self.join_worker();
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The ring this stream appends to.
    pub fn ring(&self) -> &Arc<StreamBuffer> {
        &self.ring
    }

    fn join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("audio stream thread panicked");
            }
        }
    }
}

fn run_stream(
    device_id: &str,
    role: AudioRole,
    ring: Arc<StreamBuffer>,
    running: &Arc<AtomicBool>,
    ready_tx: &mpsc::Sender<Result<String, String>>,
) {
    let device = match resolve_device(device_id, role) {
        Ok(d) => d,
        Err(message) => {
            running.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(message));
            return;
        }
    };
    let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let config = StreamConfig {
        channels: CHANNELS,
        sample_rate: SampleRate(SAMPLE_RATE),
        buffer_size: BufferSize::Default,
    };

    // Reused across callbacks; grows once to the device period size and
    // stays allocated, keeping the data path allocation-free.
    let mut scratch: Vec<u8> = Vec::new();
    let callback_ring = ring;
    let callback_running = running.clone();

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            if !callback_running.load(Ordering::Relaxed) {
                return;
            }
            scratch.clear();
            for &sample in data {
                scratch.extend_from_slice(&sample.to_le_bytes());
            }
            callback_ring.append(&scratch);
        },
        |err| tracing::error!("audio stream error: {}", err),
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            running.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(format!(
                "failed to open audio stream on {device_name:?}: {e}"
            )));
            return;
        }
    };

    if let Err(e) = stream.play() {
        running.store(false, Ordering::SeqCst);
        let _ = ready_tx.send(Err(format!("failed to start audio stream: {e}")));
        return;
    }

    let _ = ready_tx.send(Ok(device_name));

    // Keep the stream alive until stop(); dropping it releases the device.
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }
    drop(stream);
}

fn resolve_device(device_id: &str, role: AudioRole) -> Result<cpal::Device, String> {
    let host = cpal::default_host();

    match role {
        AudioRole::Input => {
            if device_id.is_empty() {
                return host
                    .default_input_device()
                    .ok_or_else(|| "no default input device".to_string());
            }
            let devices = host
                .input_devices()
                .map_err(|e| format!("failed to enumerate input devices: {e}"))?;
            find_by_name(devices, device_id)
                .ok_or_else(|| format!("input device not found: {device_id:?}"))
        }
        AudioRole::Loopback => {
            // Loopback rides on the playback device: an input stream built
            // on an output endpoint captures what that endpoint renders.
            if device_id.is_empty() {
                return host
                    .default_output_device()
                    .ok_or_else(|| "no default output device".to_string());
            }
            let devices = host
                .output_devices()
                .map_err(|e| format!("failed to enumerate output devices: {e}"))?;
            find_by_name(devices, device_id)
                .ok_or_else(|| format!("output device not found: {device_id:?}"))
        }
    }
}

fn find_by_name(
    devices: impl Iterator<Item = cpal::Device>,
    name: &str,
) -> Option<cpal::Device> {
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Some(device);
        }
    }
    None
}
