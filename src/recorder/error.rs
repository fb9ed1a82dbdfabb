// Recorder error types and result aliases
//
// One enum per component, plus the engine-level union returned from
// command calls on a `Recorder` handle.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for recorder operations
pub type RecorderResult<T> = Result<T, RecorderError>;

/// Result type for capture device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Result type for encoder operations
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Capture device failures
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The device could not be opened or configured
    #[error("Failed to open capture device: {0}")]
    OpenFailed(String),

    /// A single frame read failed; usually transient
    #[error("Failed to read frame: {0}")]
    ReadFailed(String),

    /// Transient read failures crossed the configured threshold
    #[error("Capture device failed {count} consecutive reads")]
    TooManyConsecutiveFailures { count: u32 },

    /// The handle was already closed
    #[error("Capture device is closed")]
    Closed,

    /// Open, but not currently delivering frames
    #[error("Capture device unavailable: {0}")]
    Unavailable(String),
}

impl DeviceError {
    pub fn open(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    pub fn read(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }
}

/// Encoder failures
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Every codec in the preference list failed to open
    #[error("No codec available (tried: {})", .tried.join(", "))]
    NoCodecAvailable { tried: Vec<String> },

    /// A specific codec failed to open a writable stream
    #[error("Codec {codec} failed to open: {reason}")]
    OpenFailed { codec: String, reason: String },

    /// The backend does not know this codec at all
    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// Writing a frame failed
    #[error("Failed to write frame: {0}")]
    WriteFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncodeError {
    pub fn open(codec: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::OpenFailed {
            codec: codec.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }
}

/// Session state machine rejections
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    /// A session is already recording; stop it first
    #[error("Already recording tracking number {0}")]
    AlreadyRecording(String),

    #[error("No session is recording")]
    NotRecording,

    /// The tracking number cannot be used as an artifact name
    #[error("Invalid tracking number: {0}")]
    InvalidId(String),

    /// The previous session failed and must be stopped or reset first
    #[error("Session is in error state; stop or reset it first")]
    ErrorLatched,

    /// A finalized recording already occupies this session's file name
    #[error("Recording {} already exists; scan again in a moment", .0.display())]
    ArtifactExists(PathBuf),
}

impl SessionError {
    pub fn invalid_id(reason: impl Into<String>) -> Self {
        Self::InvalidId(reason.into())
    }
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Sidecar metadata I/O failures
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Engine-level error returned from recorder commands
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The worker has exited; no further commands are accepted
    #[error("Recorder engine has stopped")]
    EngineStopped,

    #[error("Failed to spawn capture worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl RecorderError {
    /// Kind tag used when surfacing the error as an event
    pub fn kind(&self) -> super::ErrorKind {
        use super::ErrorKind;
        match self {
            Self::Session(_) => ErrorKind::Session,
            Self::Device(_) => ErrorKind::Device,
            Self::Encode(_) => ErrorKind::Encode,
            Self::Metadata(_) => ErrorKind::Metadata,
            Self::EngineStopped | Self::Spawn(_) => ErrorKind::Engine,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_codec_message_lists_attempts() {
        let err = EncodeError::NoCodecAvailable {
            tried: vec!["avc1".to_string(), "mp4v".to_string()],
        };
        assert_eq!(err.to_string(), "No codec available (tried: avc1, mp4v)");
    }

    #[test]
    fn test_recorder_error_kind() {
        let err: RecorderError = SessionError::NotRecording.into();
        assert_eq!(err.kind(), crate::recorder::ErrorKind::Session);

        let err: RecorderError = DeviceError::TooManyConsecutiveFailures { count: 3 }.into();
        assert_eq!(err.kind(), crate::recorder::ErrorKind::Device);
    }
}
