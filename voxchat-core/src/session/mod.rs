//! `CaptureSession`: the record/stop lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! CaptureSession::new()
//!     └─► start()   → device open, fresh ChunkBuffer, status = Recording
//!         └─► stop() → device released, buffer finalized, status = Idle
//! ```
//!
//! `start()` while recording returns `AlreadyRecording`; `stop()` while idle
//! returns `NotRecording`. Neither mutates state on error.
//!
//! ## Threading
//!
//! Each recording gets one capture thread. The [`InputSource`] is opened on
//! that thread (cpal streams are `!Send`) and the thread then runs the
//! [`collector`] loop. A sync oneshot channel propagates the open result back
//! to the `start()` caller, so `start()` returns only once the device is
//! confirmed open or has failed.

pub mod collector;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::{
        CaptureConfig, CaptureDiagnostics, CpalSource, DiagnosticsSnapshot, InputSource,
        SampleRate, SampleSink,
    },
    buffering::{create_sample_ring, ChunkBuffer},
    error::{Result, VoxchatError},
    events::{AudioActivityEvent, SessionStatus, SessionStatusEvent},
    wav::{self, EncodedAudio},
};

/// Broadcast capacity for status and activity events.
const BROADCAST_CAP: usize = 256;

/// The finalized output of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    buffer: ChunkBuffer,
    sample_rate: SampleRate,
}

impl Recording {
    pub fn new(buffer: ChunkBuffer, sample_rate: SampleRate) -> Self {
        Self {
            buffer,
            sample_rate,
        }
    }

    pub fn buffer(&self) -> &ChunkBuffer {
        &self.buffer
    }

    pub fn into_buffer(self) -> ChunkBuffer {
        self.buffer
    }

    pub fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer.total_samples() as f64 / self.sample_rate.get() as f64
    }

    /// Encode the captured audio as a WAV file.
    pub fn encode(&self) -> Result<EncodedAudio> {
        wav::encode(&self.buffer, self.sample_rate)
    }
}

struct ActiveCapture {
    running: Arc<AtomicBool>,
    handle: JoinHandle<ChunkBuffer>,
    sample_rate: SampleRate,
    started_at: Instant,
}

enum SessionState {
    Idle,
    Recording(ActiveCapture),
}

/// Owns the microphone for the duration of one recording at a time.
///
/// `CaptureSession` is `Send + Sync`; wrap it in `Arc` to share it between a
/// UI thread and event-forwarding tasks.
pub struct CaptureSession {
    config: CaptureConfig,
    source: Arc<dyn InputSource>,
    state: Mutex<SessionState>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    activity_tx: broadcast::Sender<AudioActivityEvent>,
    /// Counters of the current or last successfully started recording.
    diagnostics: Mutex<Arc<CaptureDiagnostics>>,
}

impl CaptureSession {
    /// Create an idle session over any capture backend.
    pub fn new<S: InputSource>(config: CaptureConfig, source: S) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (activity_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            source: Arc::new(source),
            state: Mutex::new(SessionState::Idle),
            status_tx,
            activity_tx,
            diagnostics: Mutex::new(Arc::new(CaptureDiagnostics::default())),
        }
    }

    /// Create an idle session over the system input device.
    pub fn with_default_device(config: CaptureConfig) -> Self {
        Self::new(config, CpalSource::new())
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Open the input device and start collecting chunks into a fresh buffer.
    ///
    /// Blocks until the device is confirmed open (or fails).
    ///
    /// # Errors
    /// - `VoxchatError::AlreadyRecording` if a recording is in progress.
    /// - `VoxchatError::DeviceUnavailable` when the device cannot be opened.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if matches!(*state, SessionState::Recording(_)) {
            return Err(VoxchatError::AlreadyRecording);
        }

        // Published only once the device opens, so a failed start leaves the
        // previous recording's counters readable.
        let recording_diagnostics = Arc::new(CaptureDiagnostics::default());
        let (producer, consumer) = create_sample_ring();
        let sink = SampleSink::new(producer, Arc::clone(&recording_diagnostics));
        let running = Arc::new(AtomicBool::new(true));

        // Clone everything the capture thread owns before moving it.
        let source = Arc::clone(&self.source);
        let config = self.config.clone();
        let thread_running = Arc::clone(&running);
        let diagnostics = Arc::clone(&recording_diagnostics);
        let activity_tx = self.activity_tx.clone();

        // Sync oneshot: the capture thread reports the open result to start().
        let (open_tx, open_rx) = mpsc::channel::<Result<(SampleRate, String)>>();

        let handle = thread::Builder::new()
            .name("voxchat-capture".into())
            .spawn(move || {
                // Open on THIS thread: the stream must be dropped where it was created.
                let stream = match source.open(&config, sink) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return ChunkBuffer::new();
                    }
                };

                let opened_rate = stream.sample_rate();
                if opened_rate != config.sample_rate {
                    let _ = open_tx.send(Err(VoxchatError::DeviceUnavailable(format!(
                        "device opened at {opened_rate}, expected {}",
                        config.sample_rate
                    ))));
                    return ChunkBuffer::new();
                }
                let _ = open_tx.send(Ok((opened_rate, stream.device_name().to_string())));

                collector::run(collector::CollectorContext {
                    stream,
                    consumer,
                    running: thread_running,
                    block_size: config.block_size,
                    sample_rate: opened_rate,
                    diagnostics,
                    activity_tx,
                })
            })?;

        match open_rx.recv() {
            Ok(Ok((sample_rate, device_name))) => {
                *self.diagnostics.lock() = recording_diagnostics;
                *state = SessionState::Recording(ActiveCapture {
                    running,
                    handle,
                    sample_rate,
                    started_at: Instant::now(),
                });
                drop(state);
                info!(device = device_name.as_str(), %sample_rate, "recording started");
                self.emit_status(SessionStatus::Recording, Some(device_name));
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                warn!("failed to open input device: {e}");
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent: the thread panicked.
                let _ = handle.join();
                Err(VoxchatError::Other(anyhow::anyhow!(
                    "capture thread died before opening the device"
                )))
            }
        }
    }

    /// Release the device and return everything captured since `start()`.
    ///
    /// # Errors
    /// - `VoxchatError::NotRecording` if no recording is in progress.
    pub fn stop(&self) -> Result<Recording> {
        let mut state = self.state.lock();
        let active = match std::mem::replace(&mut *state, SessionState::Idle) {
            SessionState::Recording(active) => active,
            SessionState::Idle => return Err(VoxchatError::NotRecording),
        };

        active.running.store(false, Ordering::Release);
        let joined = active.handle.join();
        drop(state);
        self.emit_status(SessionStatus::Idle, None);

        let buffer = joined.map_err(|_| {
            VoxchatError::Other(anyhow::anyhow!("capture thread panicked during recording"))
        })?;

        let snapshot = self.diagnostics();
        info!(
            chunks = buffer.chunk_count(),
            samples = buffer.total_samples(),
            samples_dropped = snapshot.samples_dropped,
            wall_secs = active.started_at.elapsed().as_secs_f64(),
            "recording stopped"
        );

        Ok(Recording::new(buffer, active.sample_rate))
    }

    /// Current session status (snapshot).
    pub fn status(&self) -> SessionStatus {
        match *self.state.lock() {
            SessionState::Idle => SessionStatus::Idle,
            SessionState::Recording(_) => SessionStatus::Recording,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.status() == SessionStatus::Recording
    }

    /// Subscribe to status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to per-chunk level events.
    pub fn subscribe_activity(&self) -> broadcast::Receiver<AudioActivityEvent> {
        self.activity_tx.subscribe()
    }

    /// Counters for the current (or last) recording.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.lock().snapshot()
    }

    fn emit_status(&self, status: SessionStatus, detail: Option<String>) {
        let _ = self.status_tx.send(SessionStatusEvent { status, detail });
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), SessionState::Idle);
        if let SessionState::Recording(active) = state {
            active.running.store(false, Ordering::Release);
            if active.handle.join().is_err() {
                warn!("capture thread panicked while releasing the device");
            }
        }
    }
}
