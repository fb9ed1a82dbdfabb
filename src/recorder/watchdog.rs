// Session duration watchdog
//
// Pure timing authority: it is polled with the current instant and answers
// whether the warning or the hard stop is due. It never sleeps and never
// preempts the capture loop.

use std::time::{Duration, Instant};

/// Outcome of a watchdog poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    /// Fired once when `max_duration - warning_window` is reached
    Warning { remaining: Duration },
    /// Maximum duration reached
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogLimits {
    pub max_duration: Duration,
    pub warning_window: Duration,
}

impl WatchdogLimits {
    pub fn warning_at(&self) -> Duration {
        self.max_duration.saturating_sub(self.warning_window)
    }
}

impl Default for WatchdogLimits {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(300),
            warning_window: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    limits: WatchdogLimits,
    started: Instant,
    warning_fired: bool,
    expired: bool,
}

impl Watchdog {
    pub fn arm(limits: WatchdogLimits, started: Instant) -> Self {
        Self {
            limits,
            started,
            warning_fired: false,
            expired: false,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }

    pub fn warning_fired(&self) -> bool {
        self.warning_fired
    }

    /// Check the deadlines against `now`
    ///
    /// Timeout wins over a warning that has not fired yet, so a poll that
    /// arrives late yields exactly one `Timeout` and never a stale warning.
    /// After `Timeout` every further poll returns `None`.
    pub fn poll(&mut self, now: Instant) -> Option<WatchdogEvent> {
        if self.expired {
            return None;
        }

        let elapsed = self.elapsed(now);
        if elapsed >= self.limits.max_duration {
            self.expired = true;
            self.warning_fired = true;
            return Some(WatchdogEvent::Timeout);
        }

        if !self.warning_fired && elapsed >= self.limits.warning_at() {
            self.warning_fired = true;
            return Some(WatchdogEvent::Warning {
                remaining: self.limits.max_duration - elapsed,
            });
        }

        None
    }
}
