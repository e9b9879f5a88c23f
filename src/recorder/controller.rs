//! Session controller
//!
//! Owns the session state machine and the capture supervisor handle. All
//! state changes happen on one task that handles one message at a time:
//!
//! ```text
//! Idle ──NewRecording──> Countdown ──last tick──> Recording ──Stop──> Processing
//!  ^                        │                                            │
//!  └────────Cancel──────────┘                 success + hold ────────────┘
//! ```
//!
//! A failed pipeline keeps the session in Processing until the user quits.

use super::cue::CountdownCue;
use super::messages::{ControllerMessage, UserAction};
use super::state::{RecordingConfig, Session, SessionState};
use super::view::SessionView;
use crate::capture::CaptureSupervisor;
use crate::config::Config;
use crate::pipeline::{PipelineDriver, ProcessingState, ProgressRelay, RelayNotification};
use crate::project::{MetadataStore, SessionMetadata, SessionStatus};
use crate::utils::{AppError, AppResult, ErrorResponse};
use chrono::Utc;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Capacity of the controller's message queue
const MESSAGE_QUEUE_CAPACITY: usize = 64;

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Front-end side of a running controller
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerMessage>,
    view: watch::Receiver<SessionView>,
}

impl ControllerHandle {
    /// Deliver a user action; false once the controller has stopped
    pub async fn send(&self, action: UserAction) -> bool {
        self.tx.send(action.into()).await.is_ok()
    }

    /// Sender for other producers (sentinel, tests)
    pub fn sender(&self) -> mpsc::Sender<ControllerMessage> {
        self.tx.clone()
    }

    /// Subscribe to view updates
    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Latest published view
    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }
}

/// Drives recording sessions
pub struct SessionController {
    config: Config,
    supervisor: Arc<dyn CaptureSupervisor>,
    metadata_store: Arc<dyn MetadataStore>,
    cue: Box<dyn CountdownCue>,
    driver: PipelineDriver,

    tx: mpsc::Sender<ControllerMessage>,
    rx: mpsc::Receiver<ControllerMessage>,
    view_tx: watch::Sender<SessionView>,

    session: Session,
    /// Last ledger snapshot from the relay; only read between messages
    processing: ProcessingState,
    error: Option<ErrorResponse>,
    external_pids: Vec<u32>,
    relay: Option<JoinHandle<ProcessingState>>,
}

impl SessionController {
    pub fn new(
        config: Config,
        supervisor: Arc<dyn CaptureSupervisor>,
        metadata_store: Arc<dyn MetadataStore>,
        cue: Box<dyn CountdownCue>,
    ) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::channel(MESSAGE_QUEUE_CAPACITY);
        let (view_tx, view) = watch::channel(SessionView::default());
        let driver = PipelineDriver::new(config.event_queue_capacity);

        let handle = ControllerHandle {
            tx: tx.clone(),
            view,
        };
        let controller = Self {
            config,
            supervisor,
            metadata_store,
            cue,
            driver,
            tx,
            rx,
            view_tx,
            session: Session::idle(),
            processing: ProcessingState::new(),
            error: None,
            external_pids: Vec::new(),
            relay: None,
        };
        (controller, handle)
    }

    /// Get the current session state
    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Handle messages until the user quits
    pub async fn run(mut self) {
        tracing::info!("Session controller started");
        self.publish();

        while let Some(message) = self.rx.recv().await {
            let flow = self.handle(message).await;
            self.publish();
            if flow.is_break() {
                break;
            }
        }

        tracing::info!("Session controller stopped");
    }

    async fn handle(&mut self, message: ControllerMessage) -> ControlFlow<()> {
        match message {
            ControllerMessage::User(action) => return self.handle_user(action).await,
            ControllerMessage::CountdownTick { session_id } => {
                self.on_countdown_tick(session_id).await
            }
            ControllerMessage::Pipeline(notification) => self.on_pipeline(notification).await,
            ControllerMessage::CompleteHoldElapsed { session_id } => {
                self.on_complete_hold(session_id)
            }
            ControllerMessage::ExternalRecording(change) => {
                self.external_pids = change.pids.into_iter().collect();
            }
        }
        ControlFlow::Continue(())
    }

    async fn handle_user(&mut self, action: UserAction) -> ControlFlow<()> {
        match (action, self.session.state) {
            (UserAction::Quit, _) => {
                self.shutdown().await;
                return ControlFlow::Break(());
            }
            (UserAction::NewRecording(config), SessionState::Idle) => {
                self.begin_countdown(config).await
            }
            (UserAction::Stop, SessionState::Recording) => self.stop_recording().await,
            (UserAction::Cancel, SessionState::Countdown) => self.cancel_countdown(),
            (action, state) => {
                tracing::debug!("Ignoring {:?} while {:?}", action, state);
            }
        }
        ControlFlow::Continue(())
    }

    async fn begin_countdown(&mut self, config: RecordingConfig) {
        self.error = None;
        self.session = Session {
            state: SessionState::Countdown,
            countdown_remaining: self.config.countdown_seconds,
            config,
            ..Session::idle()
        };
        tracing::info!(
            "Session {} counting down from {}",
            self.session.id,
            self.session.countdown_remaining
        );

        let remaining = self.session.countdown_remaining;
        if remaining == 0 {
            self.begin_capture().await;
        } else {
            self.cue.tick(remaining);
            self.schedule_countdown_tick();
        }
    }

    async fn on_countdown_tick(&mut self, session_id: Uuid) {
        if session_id != self.session.id || self.session.state != SessionState::Countdown {
            tracing::debug!("Dropping stale countdown tick for {}", session_id);
            return;
        }

        self.session.countdown_remaining = self.session.countdown_remaining.saturating_sub(1);
        let remaining = self.session.countdown_remaining;
        if remaining > 0 {
            self.cue.tick(remaining);
            self.schedule_countdown_tick();
        } else {
            self.begin_capture().await;
        }
    }

    fn cancel_countdown(&mut self) {
        tracing::info!("Countdown for session {} cancelled", self.session.id);
        self.return_to_idle();
    }

    async fn begin_capture(&mut self) {
        match self.start_capture().await {
            Ok(()) => {
                self.session.state = SessionState::Recording;
                self.session.recording_started_at = Some(Utc::now());
                tracing::info!(
                    "Recording started: {:?}",
                    self.session.output_dir()
                );
            }
            Err(e) => {
                tracing::error!("Failed to start recording: {}", e);
                self.error = Some(e.into());
                self.return_to_idle();
            }
        }
    }

    /// Create the session directory, persist metadata and start capture
    async fn start_capture(&mut self) -> AppResult<()> {
        let output_dir = self.config.session_dir(Utc::now());
        std::fs::create_dir_all(&output_dir)?;

        let metadata = SessionMetadata::new(self.session.id, self.session.config.clone());
        let metadata_path = self.metadata_store.create(&output_dir, &metadata)?;

        let options = self.session.config.resolve(output_dir, metadata_path);
        if let Err(e) = self.supervisor.start(&options).await {
            let mut metadata = metadata;
            metadata.error = Some(e.to_string());
            metadata.mark(SessionStatus::Failed);
            if let Err(write_err) = self.metadata_store.update(&options.output_dir, &metadata) {
                tracing::warn!("Failed to mark session metadata as failed: {}", write_err);
            }
            return Err(e.into());
        }

        self.session.options = Some(options);
        self.session.metadata = Some(metadata);
        Ok(())
    }

    async fn stop_recording(&mut self) {
        tracing::info!("Stopping recording for session {}", self.session.id);

        let config = &self.session.config;
        let mut processing = ProcessingState::new();
        if let Err(e) = processing.configure_skips(
            config.capture_audio,
            config.capture_screen,
            config.capture_webcam,
            config.create_vertical,
        ) {
            tracing::warn!("Unexpected pipeline configuration error: {}", e);
        }
        processing.start();

        self.session.state = SessionState::Processing;
        self.processing = processing.clone();

        let duration_ms = self
            .session
            .recording_started_at
            .map(|started| (Utc::now() - started).num_milliseconds());
        self.update_metadata(|metadata| {
            metadata.duration_ms = duration_ms;
            metadata.mark(SessionStatus::Processing);
        });

        let run = self.driver.launch(self.supervisor.clone(), &processing);
        let relay = ProgressRelay::new(processing, run, self.tx.clone());
        self.relay = Some(relay.spawn());
    }

    async fn on_pipeline(&mut self, notification: RelayNotification) {
        if self.session.state != SessionState::Processing {
            tracing::debug!(
                "Ignoring pipeline notification while {:?}",
                self.session.state
            );
            return;
        }

        match notification {
            RelayNotification::StateChanged(state) => self.processing = state,
            RelayNotification::PipelineDone { state, result } => {
                self.processing = state;
                self.relay = None;
                // Capture output is only final once the Stopping step has run
                let produced = self.supervisor.status().await.produced_files;
                match result {
                    Ok(()) => {
                        tracing::info!("Session {} processed", self.session.id);
                        self.session.completing = true;
                        self.update_metadata(|metadata| {
                            metadata.add_files(produced);
                            metadata.mark(SessionStatus::Complete);
                        });
                        self.schedule(
                            self.config.complete_hold(),
                            ControllerMessage::CompleteHoldElapsed {
                                session_id: self.session.id,
                            },
                        );
                    }
                    Err(e) => {
                        tracing::error!("Session {} processing failed: {}", self.session.id, e);
                        let message = e.to_string();
                        self.update_metadata(|metadata| {
                            metadata.add_files(produced);
                            metadata.error = Some(message);
                            metadata.mark(SessionStatus::Failed);
                        });
                        self.error = Some(AppError::Pipeline(e).into());
                    }
                }
            }
        }
    }

    fn on_complete_hold(&mut self, session_id: Uuid) {
        if session_id == self.session.id
            && self.session.state == SessionState::Processing
            && self.session.completing
        {
            self.return_to_idle();
        }
    }

    async fn shutdown(&mut self) {
        match self.session.state {
            SessionState::Recording => {
                if self.supervisor.status().await.is_recording {
                    if let Err(e) = self.supervisor.stop().await {
                        tracing::warn!("Failed to stop capture on quit: {}", e);
                    }
                }
            }
            SessionState::Processing if self.relay.is_some() => {
                tracing::warn!("Quitting while session {} is processing", self.session.id);
            }
            _ => {}
        }
        tracing::info!("Quit requested");
    }

    fn return_to_idle(&mut self) {
        tracing::info!("Session {} returning to idle", self.session.id);
        self.session = Session::idle();
        self.processing.reset();
    }

    /// Apply a change to the session's descriptor and persist it.
    ///
    /// The stored descriptor is reloaded first since the supervisor writes
    /// to it as files are produced; the in-memory copy is only a fallback.
    /// Only the initial write is fatal; later failures are logged.
    fn update_metadata(&mut self, change: impl FnOnce(&mut SessionMetadata)) {
        let Some(output_dir) = self.session.output_dir().cloned() else {
            return;
        };
        let mut metadata = match self.metadata_store.load(&output_dir) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Failed to reload session metadata, using last known copy: {}", e);
                let Some(metadata) = self.session.metadata.clone() else {
                    return;
                };
                metadata
            }
        };
        change(&mut metadata);
        if let Err(e) = self.metadata_store.update(&output_dir, &metadata) {
            tracing::warn!("Failed to update session metadata: {}", e);
        }
        self.session.metadata = Some(metadata);
    }

    fn schedule_countdown_tick(&self) {
        self.schedule(
            COUNTDOWN_TICK,
            ControllerMessage::CountdownTick {
                session_id: self.session.id,
            },
        );
    }

    /// Deliver `message` to this controller after `delay`
    fn schedule(&self, delay: Duration, message: ControllerMessage) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(message).await;
        });
    }

    fn publish(&self) {
        let view = SessionView::build(
            &self.session,
            &self.processing,
            self.error.as_ref(),
            &self.external_pids,
        );
        self.view_tx.send_replace(view);
    }
}
