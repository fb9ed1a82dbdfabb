// Video capture module
//
// A `CaptureDevice` is the raw frame source; `DeviceHandle` wraps one and
// applies the transient/fatal failure policy the capture loop relies on.

pub mod synthetic;

#[cfg(feature = "opencv")]
pub mod camera;

pub use synthetic::SyntheticDevice;

use crate::recorder::config::{DeviceKind, RecorderConfig};
use crate::recorder::error::{DeviceError, DeviceResult};
use crate::recorder::types::{Frame, Resolution};

/// Blocking frame source
///
/// Implementations are driven by a single capture thread; they must be
/// `Send` so the handle can be moved onto it.
pub trait CaptureDevice: Send {
    /// Block until a frame is available
    fn read_frame(&mut self) -> DeviceResult<Frame>;

    /// Negotiated frame size (may differ from the requested one)
    fn resolution(&self) -> Resolution;

    /// Negotiated frame rate
    fn fps(&self) -> f64;

    /// Release the device; called at most once by `DeviceHandle`
    fn close(&mut self);
}

/// Result of one read attempt that did not escalate
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    /// Transient failure, already counted; retry on the next iteration
    Retry(DeviceError),
}

/// Owned capture device with consecutive-failure tracking
pub struct DeviceHandle {
    device: Option<Box<dyn CaptureDevice>>,
    resolution: Resolution,
    fps: f64,
    failure_threshold: u32,
    consecutive_failures: u32,
    escalated: bool,
}

impl DeviceHandle {
    /// Wrap an already opened device
    pub fn new(device: Box<dyn CaptureDevice>, failure_threshold: u32) -> Self {
        let resolution = device.resolution();
        let fps = device.fps();
        Self {
            device: Some(device),
            resolution,
            fps,
            failure_threshold: failure_threshold.max(1),
            consecutive_failures: 0,
            escalated: false,
        }
    }

    /// Open the device described by the configuration
    pub fn open(config: &RecorderConfig) -> DeviceResult<Self> {
        let device: Box<dyn CaptureDevice> = match config.device {
            DeviceKind::Synthetic => {
                Box::new(SyntheticDevice::new(config.resolution(), config.fps))
            }
            DeviceKind::Camera => open_camera(config)?,
        };

        log::info!(
            "Capture device ready: {:?} {} @ {:.1} fps",
            config.device,
            device.resolution(),
            device.fps()
        );
        Ok(Self::new(device, config.max_consecutive_read_failures))
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Open and not currently in an escalated failure run
    pub fn is_healthy(&self) -> bool {
        self.is_open() && !self.escalated
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Read one frame, classifying failures
    ///
    /// Failures are transient until more than `failure_threshold` happen in
    /// a row; that read returns `TooManyConsecutiveFailures` and the count
    /// starts over. A successful read clears the escalation.
    pub fn read_frame(&mut self) -> DeviceResult<ReadOutcome> {
        let device = self.device.as_mut().ok_or(DeviceError::Closed)?;

        match device.read_frame() {
            Ok(frame) => {
                if self.escalated {
                    log::info!("Capture device recovered");
                }
                self.consecutive_failures = 0;
                self.escalated = false;
                Ok(ReadOutcome::Frame(frame))
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures > self.failure_threshold {
                    let count = self.consecutive_failures;
                    self.consecutive_failures = 0;
                    self.escalated = true;
                    log::error!("Capture device failed {} reads in a row: {}", count, e);
                    Err(DeviceError::TooManyConsecutiveFailures { count })
                } else {
                    log::debug!(
                        "Transient read failure ({}/{}): {}",
                        self.consecutive_failures,
                        self.failure_threshold,
                        e
                    );
                    Ok(ReadOutcome::Retry(e))
                }
            }
        }
    }

    /// Release the device; repeated calls do nothing
    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.close();
            log::info!("Capture device closed");
        }
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(feature = "opencv")]
fn open_camera(config: &RecorderConfig) -> DeviceResult<Box<dyn CaptureDevice>> {
    let camera =
        camera::OpenCvCamera::open(config.camera_index, config.resolution(), config.fps)?;
    Ok(Box::new(camera))
}

#[cfg(not(feature = "opencv"))]
fn open_camera(config: &RecorderConfig) -> DeviceResult<Box<dyn CaptureDevice>> {
    Err(DeviceError::open(format!(
        "camera {} requested but this build has no camera backend \
         (enable the `opencv` feature or set device = \"synthetic\")",
        config.camera_index
    )))
}
