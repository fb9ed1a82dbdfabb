// Time sources
//
// The engine reads monotonic time for durations and local wall time for
// artifact names. Both come from a `Clock` so timing behaviour can be
// driven by hand in tests.

use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// Monotonic time for elapsed-duration arithmetic
    fn now(&self) -> Instant;

    /// Local wall-clock time used for `started_at`
    fn wall_now(&self) -> DateTime<Local>;
}

/// Real system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same offset, so a test can keep one copy and hand
/// another to the engine.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base_instant: Instant,
    base_wall: DateTime<Local>,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new(wall_start: DateTime<Local>) -> Self {
        Self {
            base_instant: Instant::now(),
            base_wall: wall_start,
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Local::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base_instant + self.elapsed()
    }

    fn wall_now(&self) -> DateTime<Local> {
        let offset = chrono::Duration::from_std(self.elapsed()).unwrap_or(chrono::Duration::zero());
        self.base_wall + offset
    }
}
