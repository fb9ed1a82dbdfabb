// Core recorder data structures and types

use bytes::Bytes;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 8-bit blue, green, red
    Bgr24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Bgr24 => 3,
        }
    }
}

/// A single captured image
///
/// The pixel buffer is immutable shared storage; cloning a frame never
/// copies pixels, and consumers only ever see a read-only view.
#[derive(Debug, Clone)]
pub struct Frame {
    pub resolution: Resolution,
    pub format: PixelFormat,
    pub data: Bytes,
    /// Monotonic index assigned by the capture device
    pub sequence: u64,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(resolution: Resolution, data: impl Into<Bytes>, sequence: u64) -> Self {
        Self {
            resolution,
            format: PixelFormat::Bgr24,
            data: data.into(),
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Expected buffer length for this frame's resolution and format
    pub fn expected_len(&self) -> usize {
        self.resolution.pixel_count() * self.format.bytes_per_pixel()
    }

    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.expected_len()
    }
}

/// Frame handed to preview consumers
pub type PreviewFrame = Arc<Frame>;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Recording,
    Stopping,
    Error,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Recording => "recording",
            SessionState::Stopping => "stopping",
            SessionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Returned from a successful start
#[derive(Debug, Clone, PartialEq)]
pub struct SessionInfo {
    pub tracking_number: String,
    pub started_at: DateTime<Local>,
    pub path: PathBuf,
    pub codec: String,
}

/// Final accounting for a session that left Recording/Error
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub tracking_number: String,
    pub started_at: DateTime<Local>,
    pub path: PathBuf,
    pub frame_count: u64,
    pub duration: Duration,
}

/// Snapshot returned by a status query
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub state: SessionState,
    pub tracking_number: Option<String>,
    pub frame_count: u64,
    pub elapsed: Duration,
    pub path: Option<PathBuf>,
    pub warning_fired: bool,
}

impl SessionStatus {
    pub fn idle(frame_count: u64) -> Self {
        Self {
            state: SessionState::Idle,
            tracking_number: None,
            frame_count,
            elapsed: Duration::ZERO,
            path: None,
            warning_fired: false,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Operator,
    Timeout,
    Reset,
    Shutdown,
}

/// Category of a surfaced failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Device,
    Encode,
    Session,
    Metadata,
    Engine,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Device => "device",
            ErrorKind::Encode => "encode",
            ErrorKind::Session => "session",
            ErrorKind::Metadata => "metadata",
            ErrorKind::Engine => "engine",
        };
        f.write_str(name)
    }
}

/// Events emitted by the engine to its caller
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// Latest preview frame (best effort; intermediate frames may be skipped)
    FrameReady(PreviewFrame),

    SessionStarted {
        tracking_number: String,
        path: PathBuf,
    },

    /// The session will be stopped automatically after `remaining_secs`
    Warning { remaining_secs: u64 },

    /// The session hit its maximum duration and was finalized
    TimedOut { summary: SessionSummary },

    SessionStopped {
        summary: SessionSummary,
        reason: StopReason,
    },

    Error { kind: ErrorKind, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_shape_check() {
        let res = Resolution::new(4, 2);
        let frame = Frame::new(res, vec![0u8; 24], 0);
        assert_eq!(frame.expected_len(), 24);
        assert!(frame.is_well_formed());

        let short = Frame::new(res, vec![0u8; 10], 1);
        assert!(!short.is_well_formed());
    }

    #[test]
    fn test_frame_clone_shares_pixels() {
        let frame = Frame::new(Resolution::new(2, 2), vec![7u8; 12], 0);
        let copy = frame.clone();
        assert_eq!(frame.data.as_ptr(), copy.data.as_ptr());
    }
}
