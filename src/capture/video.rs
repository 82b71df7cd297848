//! Video capture pump
//!
//! Owns the external encoder process and a pump thread that moves its
//! encoded output into the rolling video ring. The encoder writes its
//! stream to stdout; the pump reads chunks and appends them verbatim - the
//! ring copies internally, so no intermediate buffers are kept.

use std::io::{BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::buffer::RingBuffer;
use crate::capture::launcher::{EncoderProcess, VideoEncoderLauncher};
use crate::capture::plan::RecordingPlan;
use crate::utils::error::{RecorderError, RecorderResult};

/// Pump read chunk size.
const READ_CHUNK_BYTES: usize = 1024 * 1024;
/// Buffered reader capacity over the encoder pipe.
const PIPE_BUFFER_BYTES: usize = 4 * 1024 * 1024;

type ErrorCallback = Arc<dyn Fn(std::io::Error) + Send + Sync>;

/// Captures the encoded video stream of one recording session.
pub struct VideoCapture {
    plan: RecordingPlan,
    launcher: Arc<dyn VideoEncoderLauncher>,
    ring: Arc<RingBuffer>,
    process: Arc<Mutex<Option<Box<dyn EncoderProcess>>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    running: Arc<AtomicBool>,
    on_error: Arc<Mutex<Option<ErrorCallback>>>,
}

impl VideoCapture {
    pub fn new(
        plan: RecordingPlan,
        launcher: Arc<dyn VideoEncoderLauncher>,
        ring: Arc<RingBuffer>,
    ) -> Self {
        Self {
            plan,
            launcher,
            ring,
            process: Arc::new(Mutex::new(None)),
            pump: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            on_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Register a callback fired once if the pump dies on a read error.
    /// Delivered on the pump thread; bytes already in the ring stay valid.
    pub fn set_on_error(&self, callback: impl Fn(std::io::Error) + Send + Sync + 'static) {
        *self.on_error.lock() = Some(Arc::new(callback));
    }

    /// Spawn the encoder and start pumping its output into the ring.
    pub fn start(&self) -> RecorderResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RecorderError::AlreadyRecording);
        }

        let mut process = match self.launcher.spawn(&self.plan) {
            Ok(p) => p,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        let output = match process.take_output() {
            Ok(o) => o,
            Err(e) => {
                process.kill();
                process.wait();
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        *self.process.lock() = Some(process);

        let ring = self.ring.clone();
        let running = self.running.clone();
        let on_error = self.on_error.clone();

        let handle = std::thread::spawn(move || {
            pump_loop(output, &ring, &running, &on_error);
        });
        *self.pump.lock() = Some(handle);

        tracing::info!(
            "video capture started for display {} ({} fps, {})",
            self.plan.display_index,
            self.plan.fps,
            self.plan.bitrate
        );
        Ok(())
    }

    /// Stop the pump and terminate the encoder. Idempotent and safe from
    /// any thread; returns once the pump thread has exited.
    pub fn stop(&self) -> RecorderResult<()> {
        self.running.store(false, Ordering::SeqCst);

        // Killing the process closes its stdout, which unblocks the pump.
        if let Some(mut process) = self.process.lock().take() {
            process.kill();
            process.wait();
        }

        let handle = self.pump.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("video pump thread panicked");
            }
        }

        tracing::info!("video capture stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn pump_loop(
    output: Box<dyn Read + Send>,
    ring: &RingBuffer,
    running: &AtomicBool,
    on_error: &Mutex<Option<ErrorCallback>>,
) {
    let mut reader = BufReader::with_capacity(PIPE_BUFFER_BYTES, output);
    let mut chunk = vec![0u8; READ_CHUNK_BYTES];
    let mut total: u64 = 0;

    loop {
        match reader.read(&mut chunk) {
            // EOF: the encoder exited (or was killed). Normal end.
            Ok(0) => break,
            Ok(n) => {
                ring.append(&chunk[..n]);
                total += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // A read error during stop() is just the pipe tearing down.
                if running.load(Ordering::SeqCst) {
                    tracing::warn!("video pump read error: {}", e);
                    let callback = on_error.lock().clone();
                    if let Some(callback) = callback {
                        callback(e);
                    }
                }
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    tracing::debug!("video pump exited after {} bytes", total);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::launcher::EncoderProcess;
    use std::io;
    use std::time::Duration;

    /// Fake encoder: streams a repeating pattern until killed, then EOF.
    struct FakeEncoder {
        chunk: Vec<u8>,
        limit: Option<usize>,
        fail_after: Option<usize>,
    }

    struct FakeProcess {
        stream: Option<FakeStream>,
        alive: Arc<AtomicBool>,
    }

    struct FakeStream {
        chunk: Vec<u8>,
        produced: usize,
        limit: Option<usize>,
        fail_after: Option<usize>,
        alive: Arc<AtomicBool>,
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.alive.load(Ordering::SeqCst) {
                return Ok(0);
            }
            if let Some(fail_after) = self.fail_after {
                if self.produced >= fail_after {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "encoder died"));
                }
            }
            if let Some(limit) = self.limit {
                if self.produced >= limit {
                    return Ok(0);
                }
            }
            let n = buf.len().min(self.chunk.len());
            buf[..n].copy_from_slice(&self.chunk[..n]);
            self.produced += n;
            Ok(n)
        }
    }

    impl VideoEncoderLauncher for FakeEncoder {
        fn spawn(&self, _plan: &RecordingPlan) -> RecorderResult<Box<dyn EncoderProcess>> {
            let alive = Arc::new(AtomicBool::new(true));
            Ok(Box::new(FakeProcess {
                stream: Some(FakeStream {
                    chunk: self.chunk.clone(),
                    produced: 0,
                    limit: self.limit,
                    fail_after: self.fail_after,
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

    fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn pumps_stream_into_ring_and_stops_cleanly() {
        let ring = Arc::new(RingBuffer::new(64 * 1024));
        let launcher = Arc::new(FakeEncoder {
            chunk: vec![0xAB; 4096],
            limit: None,
            fail_after: None,
        });
        let capture = VideoCapture::new(RecordingPlan::default(), launcher, ring.clone());

        capture.start().unwrap();
        assert!(wait_until(Duration::from_secs(1), || ring.len() == ring.capacity()));

        capture.stop().unwrap();
        assert!(!capture.is_running());
        assert!(ring.snapshot().iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn encoder_eof_is_not_an_error() {
        let ring = Arc::new(RingBuffer::new(1024));
        let launcher = Arc::new(FakeEncoder {
            chunk: vec![1; 100],
            limit: Some(300),
            fail_after: None,
        });
        let capture = VideoCapture::new(RecordingPlan::default(), launcher, ring.clone());

        let errors = Arc::new(AtomicBool::new(false));
        let seen = errors.clone();
        capture.set_on_error(move |_| seen.store(true, Ordering::SeqCst));

        capture.start().unwrap();
        assert!(wait_until(Duration::from_secs(1), || !capture.is_running()));
        assert_eq!(ring.len(), 300);
        assert!(!errors.load(Ordering::SeqCst));

        capture.stop().unwrap();
    }

    #[test]
    fn read_error_fires_callback_once_and_keeps_bytes() {
        let ring = Arc::new(RingBuffer::new(1024));
        let launcher = Arc::new(FakeEncoder {
            chunk: vec![7; 128],
            limit: None,
            fail_after: Some(256),
        });
        let capture = VideoCapture::new(RecordingPlan::default(), launcher, ring.clone());

        let errors = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let seen = errors.clone();
        capture.set_on_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        capture.start().unwrap();
        assert!(wait_until(Duration::from_secs(1), || !capture.is_running()));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(ring.len(), 256);

        capture.stop().unwrap();
    }

    #[test]
    fn double_start_is_rejected() {
        let ring = Arc::new(RingBuffer::new(1024));
        let launcher = Arc::new(FakeEncoder {
            chunk: vec![0; 16],
            limit: None,
            fail_after: None,
        });
        let capture = VideoCapture::new(RecordingPlan::default(), launcher, ring);

        capture.start().unwrap();
        assert!(matches!(
            capture.start(),
            Err(RecorderError::AlreadyRecording)
        ));
        capture.stop().unwrap();
    }

    #[test]
    fn stop_without_start_is_safe() {
        let ring = Arc::new(RingBuffer::new(1024));
        let launcher = Arc::new(FakeEncoder {
            chunk: vec![0; 16],
            limit: None,
            fail_after: None,
        });
        let capture = VideoCapture::new(RecordingPlan::default(), launcher, ring);

        capture.stop().unwrap();
        capture.stop().unwrap();
    }
}
