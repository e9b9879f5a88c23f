//! Progress relay
//!
//! The only writer of [`ProcessingState`] while a pipeline runs. It owns the
//! ledger by value, applies one transition per event, and forwards a
//! snapshot to the session controller after each one.

use super::driver::{PipelineRun, BOOTSTRAP_STEP};
use super::events::{ProgressEvent, ProgressKind};
use super::state::{
    PipelineError, ProcessingState, StepStatus, PROGRESS_DONE, PROGRESS_INDETERMINATE,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Notifications sent from the relay to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum RelayNotification {
    /// A progress event was applied
    StateChanged(ProcessingState),
    /// The event queue closed; carries the final ledger
    PipelineDone {
        state: ProcessingState,
        result: Result<(), PipelineError>,
    },
}

/// Consumes progress events for one pipeline run
pub struct ProgressRelay<M> {
    state: ProcessingState,
    events: mpsc::Receiver<ProgressEvent>,
    notify: mpsc::Sender<M>,
    bootstrap: Option<oneshot::Sender<()>>,
}

impl<M> ProgressRelay<M>
where
    M: From<RelayNotification> + Send + 'static,
{
    /// Take ownership of a started ledger and the run's event queue
    pub fn new(state: ProcessingState, run: PipelineRun, notify: mpsc::Sender<M>) -> Self {
        Self {
            state,
            events: run.events,
            notify,
            bootstrap: Some(run.bootstrap),
        }
    }

    /// Current ledger
    pub fn state(&self) -> &ProcessingState {
        &self.state
    }

    /// Apply a single event to the ledger
    pub fn apply(&mut self, event: &ProgressEvent) {
        let index = event.step_index;
        match &event.kind {
            ProgressKind::Started => {
                self.state.set_progress(index, PROGRESS_INDETERMINATE);
            }
            ProgressKind::PercentUpdate { percent } => {
                self.state.set_progress(index, *percent);
            }
            ProgressKind::Skipped => {
                // Skip status was fixed before the run started
                self.state.set_progress(index, PROGRESS_DONE);
            }
            ProgressKind::Completed => {
                if self.state.current_step_index() != Some(index) {
                    tracing::warn!(
                        "Completion for step {} while step {:?} is current, ignoring",
                        index,
                        self.state.current_step_index()
                    );
                    return;
                }
                self.state.advance();
                if index == BOOTSTRAP_STEP {
                    if let Some(bootstrap) = self.bootstrap.take() {
                        tracing::debug!("Capture stopped, releasing remaining steps");
                        let _ = bootstrap.send(());
                    }
                }
            }
            ProgressKind::Failed { message } => {
                // A failure reported after every step concluded fails the run
                // without touching step statuses
                let running = self
                    .state
                    .current_step()
                    .is_some_and(|step| step.status == StepStatus::Running);
                if running && self.state.current_step_index() != Some(index) {
                    tracing::warn!(
                        "Failure reported for step {} while step {:?} is current",
                        index,
                        self.state.current_step_index()
                    );
                }
                self.state.fail(message.clone());
            }
        }
    }

    /// Conclude the run after the queue closed
    fn finish(&mut self) -> Result<(), PipelineError> {
        if self.state.error().is_none() {
            if self.state.is_finished() {
                self.state.complete();
                return Ok(());
            }
            self.state.fail("pipeline ended before all steps finished");
        }
        match self.state.error() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Drain the queue until the worker closes it; returns the final ledger
    pub async fn run(mut self) -> ProcessingState {
        while let Some(event) = self.events.recv().await {
            tracing::debug!("Applying progress event {:?}", event);
            self.apply(&event);
            let snapshot = RelayNotification::StateChanged(self.state.clone());
            if self.notify.send(snapshot.into()).await.is_err() {
                tracing::warn!("Session controller went away, stopping relay");
                return self.state;
            }
        }

        let result = self.finish();
        match &result {
            Ok(()) => tracing::info!(
                "Pipeline complete in {}ms",
                self.state.elapsed().num_milliseconds()
            ),
            Err(e) => tracing::error!("Pipeline failed: {}", e),
        }
        let done = RelayNotification::PipelineDone {
            state: self.state.clone(),
            result,
        };
        if self.notify.send(done.into()).await.is_err() {
            tracing::warn!("Session controller went away before pipeline completion");
        }
        self.state
    }

    pub fn spawn(self) -> JoinHandle<ProcessingState> {
        tokio::spawn(self.run())
    }
}
