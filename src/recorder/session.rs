// Recording session state machine
//
// Owns the active encoder and the watchdog for at most one session at a
// time. Every transition happens on the capture thread; callers see the
// results as command replies and as events drained after each loop
// iteration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use super::bus::RecordingSink;
use super::clock::Clock;
use super::config::RecorderConfig;
use super::encode::{CodecBackend, Encoder};
use super::error::{DeviceError, RecorderResult, SessionError};
use super::overlay::RecordingBadge;
use super::types::{
    ErrorKind, Frame, RecorderEvent, Resolution, SessionInfo, SessionState, SessionStatus,
    SessionSummary, StopReason,
};
use super::watchdog::{Watchdog, WatchdogEvent, WatchdogLimits};
use crate::storage::naming::{ArtifactKey, validate_tracking_number};

/// Parameters fixed for every session of one engine
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub output_dir: PathBuf,
    pub fps: f64,
    /// Frame size negotiated with the device
    pub size: Resolution,
    pub codecs: Vec<String>,
    pub limits: WatchdogLimits,
    pub min_tracking_number_len: usize,
}

impl SessionSettings {
    pub fn from_config(config: &RecorderConfig, size: Resolution, fps: f64) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            fps,
            size,
            codecs: config.codec_preferences(),
            limits: WatchdogLimits {
                max_duration: config.max_duration(),
                warning_window: config.warning_window(),
            },
            min_tracking_number_len: config.min_tracking_number_len,
        }
    }
}

struct ActiveSession {
    tracking_number: String,
    started_at: DateTime<Local>,
    path: PathBuf,
    /// `None` once the session has failed and its file was released
    encoder: Option<Encoder>,
    watchdog: Watchdog,
    /// Elapsed time at the moment the session failed
    failed_after: Option<Duration>,
    frame_count: u64,
    state: SessionState,
}

impl ActiveSession {
    fn elapsed(&self, now: Instant) -> Duration {
        self.failed_after.unwrap_or_else(|| self.watchdog.elapsed(now))
    }
}

pub struct SessionMachine {
    settings: SessionSettings,
    backend: Arc<dyn CodecBackend>,
    clock: Arc<dyn Clock>,
    active: Option<ActiveSession>,
    last_frame_count: u64,
    outbox: Vec<RecorderEvent>,
}

impl SessionMachine {
    pub fn new(
        settings: SessionSettings,
        backend: Arc<dyn CodecBackend>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            backend,
            clock,
            active: None,
            last_frame_count: 0,
            outbox: Vec::new(),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map_or(SessionState::Idle, |active| active.state)
    }

    /// Begin recording `tracking_number`
    ///
    /// Only valid from `Idle`. If the device is not delivering frames or no
    /// codec opens, the machine stays `Idle` and the error is returned.
    pub fn start(
        &mut self,
        tracking_number: &str,
        device_ready: bool,
    ) -> RecorderResult<SessionInfo> {
        if let Some(active) = &self.active {
            return Err(match active.state {
                SessionState::Error => SessionError::ErrorLatched,
                _ => SessionError::AlreadyRecording(active.tracking_number.clone()),
            }
            .into());
        }

        let tracking_number =
            validate_tracking_number(tracking_number, self.settings.min_tracking_number_len)?;
        if !device_ready {
            let reason = "capture device is not delivering frames".to_string();
            return Err(DeviceError::Unavailable(reason).into());
        }

        let started_at = self.clock.wall_now();
        let key = ArtifactKey::from_local(tracking_number.as_str(), started_at);
        let path = key.video_path(&self.settings.output_dir, self.backend.extension());
        if path.exists() {
            log::warn!("Refusing to overwrite {}", path.display());
            return Err(SessionError::ArtifactExists(path).into());
        }

        let encoder = Encoder::open(
            self.backend.as_ref(),
            &path,
            self.settings.fps,
            self.settings.size,
            &self.settings.codecs,
        )
        .inspect_err(|e| log::error!("Cannot start session {}: {}", tracking_number, e))?;

        let info = SessionInfo {
            tracking_number: tracking_number.clone(),
            started_at,
            path: path.clone(),
            codec: encoder.codec().to_string(),
        };

        let started = self.clock.now();
        self.active = Some(ActiveSession {
            tracking_number: tracking_number.clone(),
            started_at,
            path: path.clone(),
            encoder: Some(encoder),
            watchdog: Watchdog::arm(self.settings.limits, started),
            failed_after: None,
            frame_count: 0,
            state: SessionState::Recording,
        });

        log::info!("Recording {} to {}", tracking_number, path.display());
        self.outbox.push(RecorderEvent::SessionStarted {
            tracking_number,
            path,
        });
        Ok(info)
    }

    /// Write one frame to the active session, if it is recording
    pub fn deliver(&mut self, frame: &Frame) {
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.state != SessionState::Recording {
            return;
        }
        let Some(encoder) = active.encoder.as_mut() else {
            return;
        };

        match encoder.write(frame) {
            Ok(()) => active.frame_count += 1,
            Err(e) => self.fail(ErrorKind::Encode, e.to_string()),
        }
    }

    /// Run the watchdog against the current time
    pub fn tick(&mut self) {
        let now = self.clock.now();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.state != SessionState::Recording {
            return;
        }

        match active.watchdog.poll(now) {
            Some(WatchdogEvent::Warning { remaining }) => {
                let remaining_secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                log::warn!(
                    "Session {} stops automatically in {}s",
                    active.tracking_number,
                    remaining_secs
                );
                self.outbox.push(RecorderEvent::Warning { remaining_secs });
            }
            Some(WatchdogEvent::Timeout) => {
                log::warn!(
                    "Session {} reached the {}s limit",
                    active.tracking_number,
                    self.settings.limits.max_duration.as_secs()
                );
                self.finalize(StopReason::Timeout);
            }
            None => {}
        }
    }

    /// The device crossed its failure threshold
    pub fn on_device_failure(&mut self, error: &DeviceError) {
        match self.state() {
            SessionState::Recording => self.fail(ErrorKind::Device, error.to_string()),
            SessionState::Idle => self.outbox.push(RecorderEvent::Error {
                kind: ErrorKind::Device,
                message: error.to_string(),
            }),
            SessionState::Error | SessionState::Stopping => {}
        }
    }

    /// Latch the session into `Error` and release its file
    fn fail(&mut self, kind: ErrorKind, message: String) {
        let now = self.clock.now();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        if active.state != SessionState::Recording {
            return;
        }

        log::error!(
            "Session {} failed after {} frames: {}",
            active.tracking_number,
            active.frame_count,
            message
        );
        active.state = SessionState::Error;
        active.failed_after = Some(active.watchdog.elapsed(now));
        if let Some(mut encoder) = active.encoder.take() {
            if let Err(e) = encoder.close() {
                log::warn!("Closing {} after failure: {}", active.path.display(), e);
            }
        }
        self.outbox.push(RecorderEvent::Error { kind, message });
    }

    /// Operator stop; a no-op while `Idle`
    pub fn stop(&mut self) -> Option<SessionSummary> {
        if self.active.is_none() {
            log::debug!("Stop requested while idle");
            return None;
        }
        self.finalize(StopReason::Operator)
    }

    /// Clear a failed session
    ///
    /// A recording session must be stopped instead.
    pub fn reset(&mut self) -> RecorderResult<Option<SessionSummary>> {
        let Some(active) = &self.active else {
            return Ok(None);
        };
        if active.state == SessionState::Recording {
            return Err(SessionError::AlreadyRecording(active.tracking_number.clone()).into());
        }
        Ok(self.finalize(StopReason::Reset))
    }

    /// Finalize whatever is active before the engine exits
    pub fn shutdown(&mut self) -> Option<SessionSummary> {
        self.finalize(StopReason::Shutdown)
    }

    fn finalize(&mut self, reason: StopReason) -> Option<SessionSummary> {
        let mut active = self.active.take()?;

        if let Some(mut encoder) = active.encoder.take() {
            if let Err(e) = encoder.close() {
                self.outbox.push(RecorderEvent::Error {
                    kind: ErrorKind::Encode,
                    message: e.to_string(),
                });
            }
        }

        let duration = active.elapsed(self.clock.now());
        let summary = SessionSummary {
            tracking_number: active.tracking_number,
            started_at: active.started_at,
            path: active.path,
            frame_count: active.frame_count,
            duration,
        };
        self.last_frame_count = summary.frame_count;

        log::info!(
            "Session {} ended ({:?}): {} frames in {:.1}s",
            summary.tracking_number,
            reason,
            summary.frame_count,
            summary.duration.as_secs_f64()
        );

        let event = match reason {
            StopReason::Timeout => RecorderEvent::TimedOut {
                summary: summary.clone(),
            },
            _ => RecorderEvent::SessionStopped {
                summary: summary.clone(),
                reason,
            },
        };
        self.outbox.push(event);
        Some(summary)
    }

    pub fn status(&self) -> SessionStatus {
        let Some(active) = &self.active else {
            return SessionStatus::idle(self.last_frame_count);
        };
        SessionStatus {
            state: active.state,
            tracking_number: Some(active.tracking_number.clone()),
            frame_count: active.frame_count,
            elapsed: active.elapsed(self.clock.now()),
            path: Some(active.path.clone()),
            warning_fired: active.watchdog.warning_fired(),
        }
    }

    /// Take the events produced since the last call
    pub fn drain_events(&mut self) -> Vec<RecorderEvent> {
        std::mem::take(&mut self.outbox)
    }
}

impl RecordingSink for SessionMachine {
    fn deliver(&mut self, frame: &Frame) {
        SessionMachine::deliver(self, frame);
    }

    fn badge(&self) -> Option<RecordingBadge> {
        let active = self.active.as_ref()?;
        let elapsed = active.elapsed(self.clock.now());
        let fps = if elapsed > Duration::ZERO {
            active.frame_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        Some(RecordingBadge {
            tracking_number: active.tracking_number.clone(),
            elapsed,
            fps,
            state: active.state,
        })
    }
}
