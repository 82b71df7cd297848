//! Real-time audio mixer
//!
//! Drains one 20 ms chunk from every active stream ring per pass, sums the
//! samples with per-stream gain, hard-clips to [-1, +1] and appends the
//! result to the mixed ring. Runs on its own worker thread so device
//! callbacks never wait on mixing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;

use crate::audio::{CHANNELS, CHUNK_BYTES, FRAMES_PER_CHUNK, MIX_INTERVAL};
use crate::buffer::StreamBuffer;
use crate::utils::error::{RecorderError, RecorderResult};

/// f32 samples per mix chunk (960 stereo frames).
const SAMPLES_PER_CHUNK: usize = FRAMES_PER_CHUNK * CHANNELS as usize;

/// One source feeding the mix.
pub struct MixerInput {
    pub ring: Arc<StreamBuffer>,
    /// Linear gain, already clamped to [0, 2].
    pub gain: f32,
}

/// Mixes all stream rings into the rolling mixed ring.
pub struct AudioMixer {
    inputs: Arc<Vec<MixerInput>>,
    mixed: Arc<StreamBuffer>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AudioMixer {
    pub fn new(inputs: Vec<MixerInput>, mixed: Arc<StreamBuffer>) -> Self {
        Self {
            inputs: Arc::new(inputs),
            mixed,
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    /// Start the 20 ms mix cadence.
    pub fn start(&self) -> RecorderResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RecorderError::AlreadyRecording);
        }

        let inputs = self.inputs.clone();
        let mixed = self.mixed.clone();
        let running = self.running.clone();

        let handle = std::thread::spawn(move || {
            mix_loop(&inputs, &mixed, &running);
        });
        *self.worker.lock() = Some(handle);

        tracing::info!("audio mixer started with {} input(s)", self.inputs.len());
        Ok(())
    }

    /// Stop mixing; returns once the worker exits (within one tick).
    pub fn stop(&self) -> RecorderResult<()> {
        self.running.store(false, Ordering::SeqCst);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("audio mixer thread panicked");
            }
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn mix_loop(inputs: &[MixerInput], mixed: &StreamBuffer, running: &AtomicBool) {
    let mut scratch = [0.0f32; SAMPLES_PER_CHUNK];
    let mut read_buf = [0u8; CHUNK_BYTES];
    let mut out_buf = [0u8; CHUNK_BYTES];

    let mut next_tick = Instant::now() + MIX_INTERVAL;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now < next_tick {
            std::thread::sleep(next_tick - now);
        }
        // Advance exactly one cadence tick. Never run catch-up passes: a
        // missed tick becomes a 20 ms gap, which beats drifting ahead of
        // the streams.
        next_tick += MIX_INTERVAL;
        let now = Instant::now();
        if next_tick < now {
            next_tick = now + MIX_INTERVAL;
        }

        mix_pass(inputs, &mut scratch, &mut read_buf);
        encode_chunk(&scratch, &mut out_buf);
        mixed.append(&out_buf);
    }

    tracing::debug!("audio mixer exited");
}

/// One mix pass: zero the scratch, then drain and accumulate every input.
/// A stream with less than a full chunk available contributes silence for
/// the missing tail.
fn mix_pass(inputs: &[MixerInput], scratch: &mut [f32], read_buf: &mut [u8]) {
    scratch.fill(0.0);

    for input in inputs {
        let n = input.ring.read(read_buf);
        if n == 0 {
            continue;
        }

        for (slot, bytes) in scratch.iter_mut().zip(read_buf[..n].chunks_exact(4)) {
            let sample = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            *slot += sample * input.gain;
        }
    }

    for sample in scratch.iter_mut() {
        *sample = sample.clamp(-1.0, 1.0);
    }
}

/// Serialize the scratch back into little-endian f32 bytes.
fn encode_chunk(scratch: &[f32], out: &mut [u8]) {
    for (sample, bytes) in scratch.iter().zip(out.chunks_exact_mut(4)) {
        bytes.copy_from_slice(&sample.to_le_bytes());
    }
}
