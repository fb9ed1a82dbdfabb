// Shared fakes for integration tests
#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parcelcam::recorder::{
    CaptureDevice, CodecBackend, DeviceError, DeviceResult, EncodeError, EncodeResult, Frame,
    RecorderConfig, RecorderEvent, RecorderEvents, Resolution, VideoWriter,
};

pub const FRAME_SIZE: Resolution = Resolution::new(4, 4);

/// Camera stand-in; can be switched into a failing state from the test
pub struct ScriptedDevice {
    seq: u64,
    pace: Duration,
    failing: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

#[derive(Clone)]
pub struct DeviceControl {
    failing: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl DeviceControl {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ScriptedDevice {
    pub fn new() -> (Box<dyn CaptureDevice>, DeviceControl) {
        let failing = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let device = ScriptedDevice {
            seq: 0,
            pace: Duration::from_millis(2),
            failing: failing.clone(),
            closed: closed.clone(),
        };
        (Box::new(device), DeviceControl { failing, closed })
    }
}

impl CaptureDevice for ScriptedDevice {
    fn read_frame(&mut self) -> DeviceResult<Frame> {
        std::thread::sleep(self.pace);
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeviceError::read("no signal"));
        }
        self.seq += 1;
        let len = FRAME_SIZE.pixel_count() * 3;
        Ok(Frame::new(FRAME_SIZE, vec![(self.seq % 256) as u8; len], self.seq))
    }

    fn resolution(&self) -> Resolution {
        FRAME_SIZE
    }

    fn fps(&self) -> f64 {
        30.0
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Counts what reaches the codec without touching the disk
#[derive(Clone, Default)]
pub struct MemoryBackend {
    /// Reject every codec
    pub reject_all: bool,
    /// Fail every write after this many frames
    pub fail_after: Option<u64>,
    pub frames: Arc<AtomicU64>,
    pub finishes: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn failing_after(frames: u64) -> Self {
        Self {
            fail_after: Some(frames),
            ..Default::default()
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn finishes(&self) -> usize {
        self.finishes.load(Ordering::SeqCst)
    }
}

struct MemoryWriter {
    fail_after: Option<u64>,
    written: u64,
    frames: Arc<AtomicU64>,
    finishes: Arc<AtomicUsize>,
}

impl VideoWriter for MemoryWriter {
    fn write(&mut self, _frame: &Frame) -> EncodeResult<()> {
        if self.fail_after.is_some_and(|limit| self.written >= limit) {
            return Err(EncodeError::write("disk full"));
        }
        self.written += 1;
        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(&mut self) -> EncodeResult<()> {
        self.finishes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl CodecBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn extension(&self) -> &str {
        "mp4"
    }

    fn open(
        &self,
        _path: &Path,
        codec: &str,
        _fps: f64,
        _size: Resolution,
    ) -> EncodeResult<Box<dyn VideoWriter>> {
        if self.reject_all {
            return Err(EncodeError::open(codec, "not installed"));
        }
        Ok(Box::new(MemoryWriter {
            fail_after: self.fail_after,
            written: 0,
            frames: self.frames.clone(),
            finishes: self.finishes.clone(),
        }))
    }
}

/// Configuration suited to fast tests writing into `dir`
pub fn test_config(dir: &Path) -> RecorderConfig {
    RecorderConfig {
        output_dir: dir.to_path_buf(),
        resolution: [FRAME_SIZE.width, FRAME_SIZE.height],
        max_consecutive_read_failures: 3,
        read_retry_backoff_ms: 1,
        overlay: false,
        ..Default::default()
    }
}

/// Wait for the first control event matching `pred`, skipping others
pub async fn wait_for_event<F>(events: &mut RecorderEvents, mut pred: F) -> RecorderEvent
where
    F: FnMut(&RecorderEvent) -> bool,
{
    let wait = async {
        loop {
            match events.recv_control().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("recorder stopped before the expected event"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for event")
}
