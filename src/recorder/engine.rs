// Recorder engine
//
// A single capture thread owns the device, the frame bus, the session
// machine and the metadata store. Callers hold a `Recorder` handle that
// sends commands over a channel and awaits the reply; events come back on
// `RecorderEvents`.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::bus::{FrameBus, PreviewReceiver};
use super::capture::{CaptureDevice, DeviceHandle, ReadOutcome};
use super::clock::{Clock, SystemClock};
use super::config::RecorderConfig;
use super::encode::{self, CodecBackend};
use super::error::{DeviceError, RecorderError, RecorderResult};
use super::overlay::OverlayStyle;
use super::session::{SessionMachine, SessionSettings};
use super::types::{
    PreviewFrame, RecorderEvent, SessionInfo, SessionState, SessionStatus, SessionSummary,
};
use crate::storage::{ArtifactKey, MetadataRecord, MetadataStore};

const WORKER_THREAD_NAME: &str = "parcelcam-capture";

/// Requests handled by the capture thread
enum Command {
    Start {
        tracking_number: String,
        reply: oneshot::Sender<RecorderResult<SessionInfo>>,
    },
    Stop {
        reply: oneshot::Sender<Option<SessionSummary>>,
    },
    Reset {
        reply: oneshot::Sender<RecorderResult<Option<SessionSummary>>>,
    },
    Status {
        reply: oneshot::Sender<SessionStatus>,
    },
    Annotate {
        key: ArtifactKey,
        problems: Vec<String>,
        notes: String,
        reply: oneshot::Sender<RecorderResult<MetadataRecord>>,
    },
}

/// Configures and launches a recorder
pub struct RecorderBuilder {
    config: RecorderConfig,
    backend: Option<Arc<dyn CodecBackend>>,
    clock: Option<Arc<dyn Clock>>,
    device: Option<Box<dyn CaptureDevice>>,
}

impl RecorderBuilder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            backend: None,
            clock: None,
            device: None,
        }
    }

    /// Encode with `backend` instead of the build's default
    pub fn with_backend(mut self, backend: Arc<dyn CodecBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Capture from an already opened device instead of the configured one
    pub fn with_device(mut self, device: Box<dyn CaptureDevice>) -> Self {
        self.device = Some(device);
        self
    }

    /// Open the device and start the capture thread
    ///
    /// Failing to open the device is the one startup error that leaves no
    /// engine behind.
    pub fn spawn(self) -> RecorderResult<(Recorder, RecorderEvents)> {
        let config = self.config;
        let device = match self.device {
            Some(device) => DeviceHandle::new(device, config.max_consecutive_read_failures),
            None => DeviceHandle::open(&config)?,
        };
        let backend = self.backend.unwrap_or_else(encode::default_backend);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let settings = SessionSettings::from_config(&config, device.resolution(), device.fps());
        log::info!(
            "Recorder output: {} via {} (codecs: {})",
            settings.output_dir.display(),
            backend.name(),
            settings.codecs.join(", ")
        );

        let bus = FrameBus::new(OverlayStyle::from_config(&config));
        let preview = bus.subscribe();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let worker = CaptureWorker {
            device,
            bus,
            session: SessionMachine::new(settings, backend, clock),
            store: MetadataStore::new(config.output_dir.clone()),
            commands: command_rx,
            events: event_tx,
            shutdown: shutdown.clone(),
            retry_backoff: config.read_retry_backoff(),
        };

        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .map_err(RecorderError::Spawn)?;

        let recorder = Recorder {
            commands: command_tx,
            shutdown,
            worker: Some(handle),
        };
        let events = RecorderEvents {
            control: event_rx,
            preview,
        };
        Ok((recorder, events))
    }
}

/// Handle to a running recorder
///
/// Dropping the handle stops the engine and waits for the capture thread,
/// so an active recording is always finalized.
pub struct Recorder {
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl Recorder {
    pub fn builder(config: RecorderConfig) -> RecorderBuilder {
        RecorderBuilder::new(config)
    }

    /// Start with the configured device and default codec backend
    pub fn spawn(config: RecorderConfig) -> RecorderResult<(Recorder, RecorderEvents)> {
        RecorderBuilder::new(config).spawn()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> RecorderResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| RecorderError::EngineStopped)?;
        response.await.map_err(|_| RecorderError::EngineStopped)
    }

    /// Begin recording under `tracking_number`
    pub async fn start(&self, tracking_number: &str) -> RecorderResult<SessionInfo> {
        let tracking_number = tracking_number.to_string();
        self.request(|reply| Command::Start {
            tracking_number,
            reply,
        })
        .await?
    }

    /// Stop the active session; `None` if nothing was active
    pub async fn stop(&self) -> RecorderResult<Option<SessionSummary>> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Return a failed session to idle
    pub async fn reset(&self) -> RecorderResult<Option<SessionSummary>> {
        self.request(|reply| Command::Reset { reply }).await?
    }

    pub async fn status(&self) -> RecorderResult<SessionStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Replace the annotations of a recording
    pub async fn annotate(
        &self,
        key: ArtifactKey,
        problems: Vec<String>,
        notes: impl Into<String>,
    ) -> RecorderResult<MetadataRecord> {
        let notes = notes.into();
        self.request(|reply| Command::Annotate {
            key,
            problems,
            notes,
            reply,
        })
        .await?
    }

    /// Ask the capture thread to finish without waiting for it
    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the engine and wait until the capture thread has released the
    /// encoder and the device
    pub async fn shutdown(mut self) -> RecorderResult<()> {
        self.shutdown.cancel();
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        match tokio::task::spawn_blocking(move || worker.join()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                log::error!("Capture thread panicked");
                Err(RecorderError::EngineStopped)
            }
            Err(e) => {
                log::error!("Failed to join capture thread: {}", e);
                Err(RecorderError::EngineStopped)
            }
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Capture thread panicked");
            }
        }
    }
}

/// Event stream of a running recorder
pub struct RecorderEvents {
    control: mpsc::UnboundedReceiver<RecorderEvent>,
    preview: PreviewReceiver,
}

impl RecorderEvents {
    /// Next event, preview frames included
    ///
    /// Control events take priority over preview frames. Returns `None`
    /// once the engine has stopped and every control event was received.
    pub async fn recv(&mut self) -> Option<RecorderEvent> {
        loop {
            tokio::select! {
                biased;

                event = self.control.recv() => return event,
                changed = self.preview.changed() => {
                    if changed.is_err() {
                        return self.control.recv().await;
                    }
                    if let Some(frame) = self.preview.borrow_and_update().clone() {
                        return Some(RecorderEvent::FrameReady(frame));
                    }
                }
            }
        }
    }

    /// Next event other than a preview frame
    pub async fn recv_control(&mut self) -> Option<RecorderEvent> {
        self.control.recv().await
    }

    pub fn try_recv_control(&mut self) -> Option<RecorderEvent> {
        self.control.try_recv().ok()
    }

    /// An independent preview receiver
    pub fn preview(&self) -> PreviewReceiver {
        self.preview.clone()
    }

    pub fn latest_frame(&self) -> Option<PreviewFrame> {
        self.preview.borrow().clone()
    }
}

struct CaptureWorker {
    device: DeviceHandle,
    bus: FrameBus,
    session: SessionMachine,
    store: MetadataStore,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<RecorderEvent>,
    shutdown: CancellationToken,
    retry_backoff: Duration,
}

impl CaptureWorker {
    fn run(mut self) {
        log::info!(
            "Capture loop running ({} @ {:.1} fps)",
            self.device.resolution(),
            self.device.fps()
        );

        while !self.shutdown.is_cancelled() {
            if !self.drain_commands() {
                log::debug!("Command channel closed");
                break;
            }

            let was_healthy = self.device.is_healthy();
            match self.device.read_frame() {
                Ok(ReadOutcome::Frame(frame)) => {
                    self.bus.dispatch(frame, &mut self.session);
                }
                Ok(ReadOutcome::Retry(_)) => std::thread::sleep(self.retry_backoff),
                Err(DeviceError::Closed) => break,
                Err(e) => {
                    if was_healthy {
                        self.session.on_device_failure(&e);
                    }
                    std::thread::sleep(self.retry_backoff);
                }
            }

            self.session.tick();
            self.flush_events();
        }

        if self.session.state() != SessionState::Idle {
            log::info!("Finalizing active session before exit");
        }
        self.session.shutdown();
        self.flush_events();
        self.device.close();
        log::info!("Capture loop stopped after {} frames", self.bus.dispatched());
    }

    /// Handle every queued command; `false` once all handles are gone
    fn drain_commands(&mut self) -> bool {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.handle(command),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start {
                tracking_number,
                reply,
            } => {
                let result = self.session.start(&tracking_number, self.device.is_healthy());
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.session.stop());
            }
            Command::Reset { reply } => {
                let _ = reply.send(self.session.reset());
            }
            Command::Status { reply } => {
                let _ = reply.send(self.session.status());
            }
            Command::Annotate {
                key,
                problems,
                notes,
                reply,
            } => {
                let result = self
                    .store
                    .save(&key, &problems, &notes)
                    .inspect_err(|e| log::error!("Failed to annotate {}: {}", key, e))
                    .map_err(RecorderError::from);
                let _ = reply.send(result);
            }
        }
        self.flush_events();
    }

    fn flush_events(&mut self) {
        for event in self.session.drain_events() {
            // Nobody listening is not an error for the engine
            let _ = self.events.send(event);
        }
    }
}
