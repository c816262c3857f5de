use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::broadcast::error::TryRecvError;
use voxchat_core::{
    audio::{CaptureConfig, InputSource, InputStream, SampleRate, SampleSink},
    error::Result,
    events::SessionStatus,
    wav::{f32_to_pcm16, WAV_HEADER_LEN},
    CaptureSession, VoxchatError,
};

/// Counts device opens and releases so tests can check nothing leaks.
#[derive(Default)]
struct DeviceLedger {
    opened: AtomicUsize,
    released: AtomicUsize,
}

/// Replays fixed blocks from a "driver" thread, like a device callback would.
struct ScriptedSource {
    blocks: Vec<Vec<f32>>,
    /// Keep delivering the script in a loop until the stream is dropped.
    repeat: bool,
    reported_rate: Option<u32>,
    ledger: Arc<DeviceLedger>,
}

impl ScriptedSource {
    fn once(blocks: Vec<Vec<f32>>, ledger: Arc<DeviceLedger>) -> Self {
        Self {
            blocks,
            repeat: false,
            reported_rate: None,
            ledger,
        }
    }
}

struct ScriptedStream {
    stop: Arc<AtomicBool>,
    driver: Option<JoinHandle<()>>,
    rate: SampleRate,
    ledger: Arc<DeviceLedger>,
}

impl InputStream for ScriptedStream {
    fn sample_rate(&self) -> SampleRate {
        self.rate
    }

    fn device_name(&self) -> &str {
        "scripted"
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(driver) = self.driver.take() {
            driver.join().expect("driver thread panicked");
        }
        self.ledger.released.fetch_add(1, Ordering::SeqCst);
    }
}

impl InputSource for ScriptedSource {
    fn open(&self, config: &CaptureConfig, mut sink: SampleSink) -> Result<Box<dyn InputStream>> {
        self.ledger.opened.fetch_add(1, Ordering::SeqCst);
        let stop = Arc::new(AtomicBool::new(false));
        let driver_stop = Arc::clone(&stop);
        let blocks = self.blocks.clone();
        let repeat = self.repeat;

        let driver = thread::spawn(move || loop {
            for block in &blocks {
                if driver_stop.load(Ordering::SeqCst) {
                    return;
                }
                sink.push(block);
                if repeat {
                    thread::sleep(Duration::from_micros(200));
                }
            }
            if !repeat {
                return;
            }
        });

        let rate = match self.reported_rate {
            Some(hz) => SampleRate::new(hz)?,
            None => config.sample_rate,
        };

        Ok(Box::new(ScriptedStream {
            stop,
            driver: Some(driver),
            rate,
            ledger: Arc::clone(&self.ledger),
        }))
    }
}

struct UnavailableSource {
    attempts: Arc<AtomicUsize>,
}

impl InputSource for UnavailableSource {
    fn open(&self, _config: &CaptureConfig, _sink: SampleSink) -> Result<Box<dyn InputStream>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(VoxchatError::DeviceUnavailable("permission denied".into()))
    }
}

/// Opens like `inner` the first time, then reports the device as gone.
struct UnpluggedAfterFirstOpen {
    inner: ScriptedSource,
    opens: AtomicUsize,
}

impl InputSource for UnpluggedAfterFirstOpen {
    fn open(&self, config: &CaptureConfig, sink: SampleSink) -> Result<Box<dyn InputStream>> {
        if self.opens.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.open(config, sink)
        } else {
            Err(VoxchatError::DeviceUnavailable("device unplugged".into()))
        }
    }
}

fn wait_for_samples(session: &CaptureSession, expected: usize) {
    let start = Instant::now();
    while session.diagnostics().samples_in < expected {
        if start.elapsed() > Duration::from_secs(2) {
            panic!("timed out waiting for {expected} samples");
        }
        thread::sleep(Duration::from_millis(2));
    }
}

fn ramp(start: usize, len: usize) -> Vec<f32> {
    (start..start + len)
        .map(|i| ((i % 2000) as f32 / 1000.0) - 1.0)
        .collect()
}

#[test]
fn stop_returns_samples_in_arrival_order() {
    let ledger = Arc::new(DeviceLedger::default());
    let a = ramp(0, 1000);
    let b = ramp(1000, 5000);
    let c = ramp(6000, 300);
    let source = ScriptedSource::once(vec![a.clone(), b.clone(), c.clone()], Arc::clone(&ledger));
    let session = CaptureSession::new(CaptureConfig::default(), source);

    session.start().expect("start");
    assert_eq!(session.status(), SessionStatus::Recording);
    wait_for_samples(&session, 6300);

    let recording = session.stop().expect("stop");
    assert_eq!(session.status(), SessionStatus::Idle);

    let expected: Vec<f32> = a.into_iter().chain(b).chain(c).collect();
    assert_eq!(recording.buffer().flatten(), expected);
    assert_eq!(recording.sample_rate().get(), 16_000);

    // 6300 samples re-blocked at 4096: one full chunk plus the tail.
    let lens: Vec<usize> = recording.buffer().chunks().iter().map(|c| c.len()).collect();
    assert_eq!(lens, vec![4096, 2204]);

    assert_eq!(ledger.opened.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.released.load(Ordering::SeqCst), 1);
}

#[test]
fn start_twice_fails_with_already_recording() {
    let ledger = Arc::new(DeviceLedger::default());
    let session = CaptureSession::new(
        CaptureConfig::default(),
        ScriptedSource::once(vec![vec![0.1; 16]], Arc::clone(&ledger)),
    );

    session.start().expect("first start");
    let err = session.start().expect_err("second start must fail");
    assert!(matches!(err, VoxchatError::AlreadyRecording));
    assert_eq!(ledger.opened.load(Ordering::SeqCst), 1);

    session.stop().expect("stop");
}

#[test]
fn stop_while_idle_fails_with_not_recording() {
    let ledger = Arc::new(DeviceLedger::default());
    let session = CaptureSession::new(
        CaptureConfig::default(),
        ScriptedSource::once(vec![vec![0.1; 16]], Arc::clone(&ledger)),
    );

    let err = session.stop().expect_err("stop without start");
    assert!(matches!(err, VoxchatError::NotRecording));
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(ledger.opened.load(Ordering::SeqCst), 0);
    assert_eq!(session.diagnostics().samples_in, 0);
}

#[test]
fn unavailable_device_leaves_session_idle_and_restartable() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let session = CaptureSession::new(
        CaptureConfig::default(),
        UnavailableSource {
            attempts: Arc::clone(&attempts),
        },
    );

    for _ in 0..2 {
        let err = session.start().expect_err("device unavailable");
        assert!(matches!(err, VoxchatError::DeviceUnavailable(_)));
        assert_eq!(session.status(), SessionStatus::Idle);
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(matches!(session.stop(), Err(VoxchatError::NotRecording)));
}

#[test]
fn rate_mismatch_is_rejected_and_device_released() {
    let ledger = Arc::new(DeviceLedger::default());
    let mut source = ScriptedSource::once(vec![vec![0.0; 8]], Arc::clone(&ledger));
    source.reported_rate = Some(44_100);
    let session = CaptureSession::new(CaptureConfig::default(), source);

    let err = session.start().expect_err("mismatched rate");
    assert!(matches!(err, VoxchatError::DeviceUnavailable(_)));
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(ledger.opened.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.released.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_restart_keeps_last_recording_diagnostics() {
    let ledger = Arc::new(DeviceLedger::default());
    let session = CaptureSession::new(
        CaptureConfig::default(),
        UnpluggedAfterFirstOpen {
            inner: ScriptedSource::once(vec![vec![0.3; 5000]], Arc::clone(&ledger)),
            opens: AtomicUsize::new(0),
        },
    );

    session.start().expect("first start");
    wait_for_samples(&session, 5000);
    session.stop().expect("stop");
    let last = session.diagnostics();
    assert_eq!(last.samples_in, 5000);
    assert_eq!(last.chunks_collected, 2);

    let err = session.start().expect_err("device gone");
    assert!(matches!(err, VoxchatError::DeviceUnavailable(_)));
    assert_eq!(session.diagnostics(), last);
}

#[test]
fn each_recording_starts_with_a_fresh_buffer() {
    let ledger = Arc::new(DeviceLedger::default());
    let session = CaptureSession::new(
        CaptureConfig::default(),
        ScriptedSource::once(vec![vec![0.25; 500]], Arc::clone(&ledger)),
    );

    session.start().expect("first start");
    wait_for_samples(&session, 500);
    let first = session.stop().expect("first stop");

    session.start().expect("second start");
    wait_for_samples(&session, 500);
    let second = session.stop().expect("second stop");

    assert_eq!(first.buffer().total_samples(), 500);
    assert_eq!(second.buffer().total_samples(), 500);
    assert_eq!(session.diagnostics().samples_in, 500);
    assert_eq!(ledger.released.load(Ordering::SeqCst), 2);
}

#[test]
fn stopping_mid_stream_keeps_whole_blocks_only() {
    let ledger = Arc::new(DeviceLedger::default());
    let block_lens = [300usize, 700, 1100];
    let blocks: Vec<Vec<f32>> = block_lens
        .iter()
        .enumerate()
        .map(|(i, &len)| vec![i as f32 / 10.0; len])
        .collect();
    let mut source = ScriptedSource::once(blocks, Arc::clone(&ledger));
    source.repeat = true;
    let session = CaptureSession::new(CaptureConfig::default(), source);

    session.start().expect("start");
    wait_for_samples(&session, 10_000);
    let recording = session.stop().expect("stop");

    // Whatever was captured must be an exact prefix of the block sequence.
    let samples = recording.buffer().flatten();
    let mut offset = 0;
    let mut block = 0;
    while offset < samples.len() {
        let len = block_lens[block % 3];
        let value = (block % 3) as f32 / 10.0;
        assert!(
            offset + len <= samples.len(),
            "block {block} was cut short at teardown"
        );
        assert!(samples[offset..offset + len].iter().all(|&s| s == value));
        offset += len;
        block += 1;
    }
    assert_eq!(samples.len(), session.diagnostics().samples_in);
    assert_eq!(ledger.released.load(Ordering::SeqCst), 1);
}

#[test]
fn status_and_activity_events_are_broadcast() {
    let ledger = Arc::new(DeviceLedger::default());
    let session = CaptureSession::new(
        CaptureConfig::default(),
        ScriptedSource::once(vec![vec![0.5; 4096 * 2]], Arc::clone(&ledger)),
    );
    let mut status_rx = session.subscribe_status();
    let mut activity_rx = session.subscribe_activity();

    session.start().expect("start");
    wait_for_samples(&session, 8192);
    session.stop().expect("stop");

    let first = status_rx.try_recv().expect("recording event");
    assert_eq!(first.status, SessionStatus::Recording);
    assert_eq!(first.detail.as_deref(), Some("scripted"));
    let second = status_rx.try_recv().expect("idle event");
    assert_eq!(second.status, SessionStatus::Idle);
    assert!(matches!(status_rx.try_recv(), Err(TryRecvError::Empty)));

    let mut levels = Vec::new();
    while let Ok(event) = activity_rx.try_recv() {
        levels.push(event);
    }
    assert_eq!(levels.len(), 2);
    assert_eq!(levels[1].chunk_index, 1);
    assert!((levels[0].rms - 0.5).abs() < 1e-6);
    assert!((levels[1].elapsed_secs - 0.512).abs() < 1e-9);
}

#[test]
fn recording_encodes_to_canonical_wav() {
    let ledger = Arc::new(DeviceLedger::default());
    let samples = vec![0.5, -1.0, 0.0, 0.75];
    let session = CaptureSession::new(
        CaptureConfig::default(),
        ScriptedSource::once(vec![samples.clone()], Arc::clone(&ledger)),
    );

    session.start().expect("start");
    wait_for_samples(&session, samples.len());
    let recording = session.stop().expect("stop");
    let encoded = recording.encode().expect("encode");

    assert_eq!(encoded.byte_len(), WAV_HEADER_LEN + samples.len() * 2);
    let payload: Vec<i16> = encoded.as_bytes()[WAV_HEADER_LEN..]
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();
    let expected: Vec<i16> = samples.iter().map(|&s| f32_to_pcm16(s)).collect();
    assert_eq!(payload, expected);
}

#[test]
fn dropping_a_recording_session_releases_the_device() {
    let ledger = Arc::new(DeviceLedger::default());
    {
        let session = CaptureSession::new(
            CaptureConfig::default(),
            ScriptedSource::once(vec![vec![0.1; 64]], Arc::clone(&ledger)),
        );
        session.start().expect("start");
    }
    assert_eq!(ledger.opened.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.released.load(Ordering::SeqCst), 1);
}
