//! Pipeline driver
//!
//! Runs the post-processing steps on a background worker and turns the
//! supervisor's reports into an ordered stream of [`ProgressEvent`]s.
//!
//! Step 0 (stopping the capture) is run by the worker itself. The rest of
//! the pipeline is only handed to the supervisor once the relay has applied
//! that step's completion, since nothing can be processed before the
//! recorder has flushed its output.

use super::events::{ProgressEvent, ProgressKind};
use super::state::{ProcessingState, StepKind, StepStatus};
use crate::capture::CaptureSupervisor;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Index of the step that stops the capture
pub const BOOTSTRAP_STEP: usize = 0;

/// A step as the supervisor sees it when the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStep {
    pub index: usize,
    pub kind: StepKind,
    pub skipped: bool,
}

/// Tracks which events are still acceptable for the run
#[derive(Debug)]
struct SinkCursor {
    kinds: Vec<StepKind>,
    skipped: Vec<bool>,
    /// First step without a terminal event
    next_step: usize,
    /// Step that has started but not yet concluded
    open_step: Option<usize>,
    halted: bool,
}

impl SinkCursor {
    fn new(plan: &ProcessingState) -> Self {
        Self {
            kinds: plan.steps().iter().map(|s| s.kind).collect(),
            skipped: plan
                .steps()
                .iter()
                .map(|s| s.status == StepStatus::Skipped)
                .collect(),
            next_step: 0,
            open_step: None,
            halted: false,
        }
    }

    /// Validate an event and return what should be forwarded.
    ///
    /// Supervisors may leave out `Started` and `Skipped` events; gaps made
    /// only of skipped steps are filled in so the stream stays complete.
    fn admit(&mut self, event: ProgressEvent) -> Vec<ProgressEvent> {
        let index = event.step_index;
        if self.halted {
            return reject(event, "pipeline already failed");
        }

        if self.open_step == Some(index) {
            return match event.kind {
                ProgressKind::Started | ProgressKind::Skipped => {
                    reject(event, "step already started")
                }
                ProgressKind::PercentUpdate { .. } => vec![event],
                ProgressKind::Completed => {
                    self.conclude(index, false);
                    vec![event]
                }
                ProgressKind::Failed { .. } => {
                    self.conclude(index, true);
                    vec![event]
                }
            };
        }
        if self.open_step.is_some() {
            return reject(event, "another step is still running");
        }

        let Some(mut forwarded) = self.gap_to(index) else {
            return reject(event, "out of order");
        };
        let configured_skip = self.skipped[index];
        match (&event.kind, configured_skip) {
            (ProgressKind::Skipped, true) => self.next_step = index + 1,
            (ProgressKind::Skipped, false) => {
                return reject(event, "step is not configured to be skipped")
            }
            (_, true) => return reject(event, "step is configured to be skipped"),
            (ProgressKind::Started | ProgressKind::PercentUpdate { .. }, false) => {
                self.next_step = index;
                self.open_step = Some(index);
            }
            (ProgressKind::Completed, false) => self.conclude(index, false),
            (ProgressKind::Failed { .. }, false) => self.conclude(index, true),
        }
        forwarded.push(event);
        forwarded
    }

    fn conclude(&mut self, index: usize, failed: bool) {
        self.open_step = None;
        self.next_step = index + 1;
        self.halted |= failed;
    }

    /// Skipped events for every step between `next_step` and `index`, if
    /// all of them are configured as skipped
    fn gap_to(&self, index: usize) -> Option<Vec<ProgressEvent>> {
        if index < self.next_step || index >= self.skipped.len() {
            return None;
        }
        (self.next_step..index)
            .all(|i| self.skipped[i])
            .then(|| (self.next_step..index).map(ProgressEvent::skipped).collect())
    }

    /// Skipped events for trailing skipped steps once the supervisor is done
    fn trailing_skips(&mut self) -> Vec<ProgressEvent> {
        if self.halted || self.open_step.is_some() {
            return Vec::new();
        }
        let mut events = Vec::new();
        while self.next_step < self.skipped.len() && self.skipped[self.next_step] {
            events.push(ProgressEvent::skipped(self.next_step));
            self.next_step += 1;
        }
        events
    }

    /// Halt the run for a worker-level failure and return the step to
    /// report it against.
    ///
    /// That is the open step, else the next step still to run, else the
    /// last step. None when a failure has already been reported.
    fn fail_run(&mut self) -> Option<usize> {
        if self.halted {
            return None;
        }
        let last = self.skipped.len().saturating_sub(1);
        let index = self
            .open_step
            .or_else(|| (self.next_step..self.skipped.len()).find(|&i| !self.skipped[i]))
            .unwrap_or(last);
        self.open_step = None;
        self.next_step = self.skipped.len();
        self.halted = true;
        Some(index)
    }

    fn is_concluded(&self) -> bool {
        self.halted
            || (self.open_step.is_none()
                && (self.next_step..self.skipped.len()).all(|i| self.skipped[i]))
    }
}

fn reject(event: ProgressEvent, reason: &str) -> Vec<ProgressEvent> {
    tracing::warn!("Dropping progress event {:?}: {}", event, reason);
    Vec::new()
}

/// Where supervisors report step progress.
///
/// Events that would break the per-step ordering (Started, updates, one
/// terminal event, steps in order) are dropped with a warning.
pub struct ProgressSink {
    tx: mpsc::Sender<ProgressEvent>,
    cursor: Mutex<SinkCursor>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>, plan: &ProcessingState) -> Self {
        Self {
            tx,
            cursor: Mutex::new(SinkCursor::new(plan)),
        }
    }

    /// Steps of this run, including skipped ones
    pub fn planned_steps(&self) -> Vec<PlannedStep> {
        let cursor = self.cursor.lock();
        cursor
            .kinds
            .iter()
            .zip(&cursor.skipped)
            .enumerate()
            .map(|(index, (&kind, &skipped))| PlannedStep {
                index,
                kind,
                skipped,
            })
            .collect()
    }

    /// Report an event from a blocking thread.
    ///
    /// Returns false once the relay has gone away.
    pub fn emit(&self, event: ProgressEvent) -> bool {
        let events = self.cursor.lock().admit(event);
        events.into_iter().all(|e| self.tx.blocking_send(e).is_ok())
    }

    pub fn started(&self, step_index: usize) -> bool {
        self.emit(ProgressEvent::started(step_index))
    }

    pub fn percent(&self, step_index: usize, percent: f32) -> bool {
        self.emit(ProgressEvent::percent(step_index, percent))
    }

    pub fn skipped(&self, step_index: usize) -> bool {
        self.emit(ProgressEvent::skipped(step_index))
    }

    pub fn completed(&self, step_index: usize) -> bool {
        self.emit(ProgressEvent::completed(step_index))
    }

    pub fn failed(&self, step_index: usize, message: impl Into<String>) -> bool {
        self.emit(ProgressEvent::failed(step_index, message))
    }

    /// Whether every step has concluded or the run has failed
    pub fn is_concluded(&self) -> bool {
        self.cursor.lock().is_concluded()
    }

    async fn emit_async(&self, event: ProgressEvent) -> bool {
        let events = self.cursor.lock().admit(event);
        for event in events {
            if self.tx.send(event).await.is_err() {
                return false;
            }
        }
        true
    }

    async fn finish_async(&self) {
        let events = self.cursor.lock().trailing_skips();
        for event in events {
            if self.tx.send(event).await.is_err() {
                return;
            }
        }
    }

    /// Report a failure the supervisor returned instead of emitting.
    ///
    /// Bypasses ordering checks so the error reaches the relay even when
    /// every step has already concluded.
    async fn fail_async(&self, message: String) {
        let target = self.cursor.lock().fail_run();
        match target {
            Some(index) => {
                let _ = self.tx.send(ProgressEvent::failed(index, message)).await;
            }
            None => tracing::warn!("Pipeline error after a reported failure: {}", message),
        }
    }
}

/// Handles returned by [`PipelineDriver::launch`]
pub struct PipelineRun {
    /// Event queue, consumed by the progress relay
    pub events: mpsc::Receiver<ProgressEvent>,
    /// Fired by the relay once the bootstrap step's completion is applied
    pub bootstrap: oneshot::Sender<()>,
    pub worker: JoinHandle<()>,
}

/// Launches pipeline workers
#[derive(Debug, Clone)]
pub struct PipelineDriver {
    queue_capacity: usize,
}

impl PipelineDriver {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Spawn the worker for one run; `plan` is the configured, started ledger.
    pub fn launch(
        &self,
        supervisor: Arc<dyn CaptureSupervisor>,
        plan: &ProcessingState,
    ) -> PipelineRun {
        let (tx, events) = mpsc::channel(self.queue_capacity);
        let (bootstrap, bootstrap_rx) = oneshot::channel();
        let sink = Arc::new(ProgressSink::new(tx, plan));
        let worker = tokio::spawn(run_worker(supervisor, sink, bootstrap_rx));

        PipelineRun {
            events,
            bootstrap,
            worker,
        }
    }
}

async fn run_worker(
    supervisor: Arc<dyn CaptureSupervisor>,
    sink: Arc<ProgressSink>,
    bootstrap: oneshot::Receiver<()>,
) {
    tracing::info!("Pipeline worker started");

    sink.emit_async(ProgressEvent::started(BOOTSTRAP_STEP)).await;
    if let Err(e) = supervisor.stop().await {
        tracing::error!("Failed to stop capture: {}", e);
        sink.emit_async(ProgressEvent::failed(BOOTSTRAP_STEP, e.to_string()))
            .await;
        return;
    }
    sink.emit_async(ProgressEvent::completed(BOOTSTRAP_STEP)).await;

    if bootstrap.await.is_err() {
        tracing::warn!("Progress relay went away before the capture stop was applied");
        return;
    }

    let blocking_sink = sink.clone();
    let result = tokio::task::spawn_blocking(move || {
        supervisor.run_pipeline_with_progress(&blocking_sink)
    })
    .await;

    match result {
        Ok(Ok(())) => {
            sink.finish_async().await;
            if !sink.is_concluded() {
                tracing::warn!("Supervisor returned before every step finished");
            }
        }
        Ok(Err(e)) => {
            tracing::error!("Pipeline failed: {}", e);
            sink.fail_async(e.to_string()).await;
        }
        Err(e) => {
            tracing::error!("Pipeline task panicked: {}", e);
            sink.fail_async(format!("Pipeline task panicked: {}", e))
                .await;
        }
    }

    // Dropping the last sink closes the queue.
    tracing::info!("Pipeline worker finished");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(has_audio: bool, create_vertical: bool) -> ProcessingState {
        let mut state = ProcessingState::new();
        state
            .configure_skips(has_audio, true, false, create_vertical)
            .unwrap();
        state.start();
        state
    }

    fn indices(events: &[ProgressEvent]) -> Vec<(usize, bool)> {
        events
            .iter()
            .map(|e| (e.step_index, e.kind == ProgressKind::Skipped))
            .collect()
    }

    #[test]
    fn test_cursor_accepts_ordered_stream() {
        let mut cursor = SinkCursor::new(&plan(true, true));
        for index in 0..5 {
            assert_eq!(cursor.admit(ProgressEvent::started(index)).len(), 1);
            assert_eq!(cursor.admit(ProgressEvent::percent(index, 50.0)).len(), 1);
            assert_eq!(cursor.admit(ProgressEvent::completed(index)).len(), 1);
        }
        assert!(cursor.is_concluded());
    }

    #[test]
    fn test_cursor_fills_skipped_gap() {
        let mut cursor = SinkCursor::new(&plan(false, false));
        cursor.admit(ProgressEvent::started(0));
        cursor.admit(ProgressEvent::completed(0));

        // Analyzing and Normalizing are skipped; the supervisor jumps to Merging
        let forwarded = cursor.admit(ProgressEvent::started(3));
        assert_eq!(indices(&forwarded), vec![(1, true), (2, true), (3, false)]);

        cursor.admit(ProgressEvent::completed(3));
        assert!(cursor.is_concluded());
        assert_eq!(indices(&cursor.trailing_skips()), vec![(4, true)]);
    }

    #[test]
    fn test_cursor_rejects_out_of_order_events() {
        let mut cursor = SinkCursor::new(&plan(true, true));
        // Step 2 cannot start before step 0 and 1 conclude
        assert!(cursor.admit(ProgressEvent::started(2)).is_empty());

        cursor.admit(ProgressEvent::started(0));
        // Second start and foreign updates are dropped
        assert!(cursor.admit(ProgressEvent::started(0)).is_empty());
        assert!(cursor.admit(ProgressEvent::percent(1, 10.0)).is_empty());
        assert!(cursor.admit(ProgressEvent::completed(1)).is_empty());

        cursor.admit(ProgressEvent::completed(0));
        // Terminal event for a concluded step is dropped
        assert!(cursor.admit(ProgressEvent::completed(0)).is_empty());
        // Skipping a step that is configured to run is dropped
        assert!(cursor.admit(ProgressEvent::skipped(1)).is_empty());
    }

    #[test]
    fn test_cursor_halts_after_failure() {
        let mut cursor = SinkCursor::new(&plan(true, true));
        cursor.admit(ProgressEvent::started(0));
        cursor.admit(ProgressEvent::completed(0));

        assert_eq!(cursor.admit(ProgressEvent::failed(1, "boom")).len(), 1);
        assert!(cursor.is_concluded());
        assert_eq!(cursor.fail_run(), None);
        assert!(cursor.admit(ProgressEvent::started(2)).is_empty());
    }

    #[test]
    fn test_worker_failure_targets_open_or_next_step() {
        let mut cursor = SinkCursor::new(&plan(false, true));
        cursor.admit(ProgressEvent::started(0));
        assert_eq!(cursor.fail_run(), Some(0));

        let mut cursor = SinkCursor::new(&plan(false, true));
        cursor.admit(ProgressEvent::started(0));
        cursor.admit(ProgressEvent::completed(0));
        // Analyzing and Normalizing are skipped
        assert_eq!(cursor.fail_run(), Some(3));
        assert!(cursor.is_concluded());
        assert!(cursor.trailing_skips().is_empty());
    }

    #[test]
    fn test_worker_failure_after_all_steps_concluded() {
        let mut cursor = SinkCursor::new(&plan(true, true));
        for index in 0..5 {
            cursor.admit(ProgressEvent::started(index));
            cursor.admit(ProgressEvent::completed(index));
        }
        assert!(cursor.is_concluded());
        assert_eq!(cursor.fail_run(), Some(4));
        assert_eq!(cursor.fail_run(), None);
    }

    #[tokio::test]
    async fn test_late_supervisor_error_is_forwarded() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut state = ProcessingState::new();
        state.configure_skips(false, false, false, false).unwrap();
        state.start();
        let sink = ProgressSink::new(tx, &state);

        sink.emit_async(ProgressEvent::started(0)).await;
        sink.emit_async(ProgressEvent::completed(0)).await;
        assert!(sink.is_concluded());
        sink.fail_async("disk full writing output".to_string()).await;
        drop(sink);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(
            events.last(),
            Some(&ProgressEvent::failed(4, "disk full writing output"))
        );
    }

    #[test]
    fn test_planned_steps() {
        let (tx, _rx) = mpsc::channel(4);
        let sink = ProgressSink::new(tx, &plan(false, true));
        let skipped: Vec<StepKind> = sink
            .planned_steps()
            .into_iter()
            .filter(|s| s.skipped)
            .map(|s| s.kind)
            .collect();
        assert_eq!(skipped, vec![StepKind::Analyzing, StepKind::Normalizing]);
    }
}
