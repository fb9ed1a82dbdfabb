// Parcel Recording Engine
//
// Captures frames from a camera on a dedicated thread, records them to a
// video file under a tracking number, enforces the maximum session length
// and keeps running through device and codec failures.

pub mod bus;
pub mod capture;
pub mod clock;
pub mod config;
pub mod encode;
pub mod engine;
pub mod error;
pub mod overlay;
pub mod session;
pub mod types;
pub mod watchdog;

pub use bus::{FrameBus, PreviewReceiver, RecordingSink};
pub use capture::{CaptureDevice, DeviceHandle, ReadOutcome, SyntheticDevice};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DeviceKind, RecorderConfig};
pub use encode::{CodecBackend, Encoder, VideoWriter, Y4mBackend};
pub use engine::{Recorder, RecorderBuilder, RecorderEvents};
pub use error::{
    ConfigError, DeviceError, DeviceResult, EncodeError, EncodeResult, MetadataError,
    RecorderError, RecorderResult, SessionError,
};
pub use session::{SessionMachine, SessionSettings};
pub use types::*;
pub use watchdog::{Watchdog, WatchdogEvent, WatchdogLimits};
