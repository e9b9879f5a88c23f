//! Post-processing step ledger
//!
//! Tracks the ordered steps of the pipeline that runs after a recording
//! stops, along with their statuses, timestamps, and progress.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Progress value meaning "running, but no percentage known"
pub const PROGRESS_INDETERMINATE: i8 = -1;

/// Progress value of a finished step
pub const PROGRESS_DONE: i8 = 100;

/// The fixed steps of the post-processing pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    /// Stop the capture and flush its files
    Stopping,
    /// Measure loudness of the recorded audio
    Analyzing,
    /// Apply loudness normalization
    Normalizing,
    /// Merge screen, webcam and audio streams
    Merging,
    /// Build the vertical (portrait) variant
    Vertical,
}

impl StepKind {
    /// Pipeline order
    pub const ALL: [StepKind; 5] = [
        StepKind::Stopping,
        StepKind::Analyzing,
        StepKind::Normalizing,
        StepKind::Merging,
        StepKind::Vertical,
    ];

    /// Human readable label for the step
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Stopping => "Stopping recording",
            StepKind::Analyzing => "Analyzing audio",
            StepKind::Normalizing => "Normalizing audio",
            StepKind::Merging => "Merging streams",
            StepKind::Vertical => "Building vertical video",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Whether the status can no longer change
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Complete | StepStatus::Failed | StepStatus::Skipped)
    }
}

/// One named unit of the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub kind: StepKind,
    pub status: StepStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Percent complete, or `PROGRESS_INDETERMINATE`
    pub progress: i8,
}

impl Step {
    fn new(kind: StepKind) -> Self {
        Self {
            kind,
            status: StepStatus::Pending,
            start_time: None,
            end_time: None,
            progress: PROGRESS_INDETERMINATE,
        }
    }

    fn begin(&mut self, now: DateTime<Utc>) {
        if self.status != StepStatus::Pending {
            return;
        }
        self.status = StepStatus::Running;
        self.start_time = Some(now);
        self.progress = PROGRESS_INDETERMINATE;
    }

    fn finish(&mut self, status: StepStatus, now: DateTime<Utc>) {
        if self.status != StepStatus::Running {
            return;
        }
        self.status = status;
        // Wall clock may step backwards; never record an end before the start.
        self.end_time = Some(self.start_time.map_or(now, |start| start.max(now)));
        if status == StepStatus::Complete {
            self.progress = PROGRESS_DONE;
        }
    }

    /// Time spent in the step so far (or in total once finished)
    pub fn duration(&self) -> Option<Duration> {
        let start = self.start_time?;
        Some(self.end_time.unwrap_or_else(Utc::now) - start)
    }
}

/// Error recorded when the pipeline fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineError {
    /// Step that was running when the failure happened, if any
    pub step: Option<StepKind>,
    pub message: String,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(step) => write!(f, "{} failed: {}", step, self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for PipelineError {}

/// Misuse of the ledger's configuration API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipelineStateError {
    #[error("skips are already configured")]
    AlreadyConfigured,

    #[error("processing has already started")]
    AlreadyStarted,
}

/// Ordered step ledger for one post-processing run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingState {
    steps: Vec<Step>,
    /// `None` before start; `Some(steps.len())` once past the last step
    current_step_index: Option<usize>,
    is_processing: bool,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    error: Option<PipelineError>,
    skips_configured: bool,
}

impl ProcessingState {
    /// Create a ledger with every step pending
    pub fn new() -> Self {
        Self {
            steps: StepKind::ALL.iter().copied().map(Step::new).collect(),
            current_step_index: None,
            is_processing: false,
            start_time: None,
            end_time: None,
            error: None,
            skips_configured: false,
        }
    }

    /// Mark steps the session cannot use as skipped.
    ///
    /// Allowed once per run, before `start`.
    pub fn configure_skips(
        &mut self,
        has_audio: bool,
        has_screen: bool,
        has_webcam: bool,
        create_vertical: bool,
    ) -> Result<(), PipelineStateError> {
        if self.start_time.is_some() {
            return Err(PipelineStateError::AlreadyStarted);
        }
        if self.skips_configured {
            return Err(PipelineStateError::AlreadyConfigured);
        }
        self.skips_configured = true;

        for step in &mut self.steps {
            let skip = match step.kind {
                StepKind::Stopping => false,
                StepKind::Analyzing | StepKind::Normalizing => !has_audio,
                StepKind::Merging => !has_screen && !has_webcam,
                StepKind::Vertical => !create_vertical,
            };
            if skip {
                step.status = StepStatus::Skipped;
            }
        }

        tracing::debug!(
            "Configured pipeline skips: {:?}",
            self.skipped_kinds().collect::<Vec<_>>()
        );
        Ok(())
    }

    /// Begin processing at the first step that is not skipped
    pub fn start(&mut self) {
        if self.is_processing {
            tracing::warn!("Pipeline already processing, ignoring start");
            return;
        }
        let now = Utc::now();
        self.is_processing = true;
        self.start_time = Some(now);
        self.end_time = None;

        let first = self.next_eligible(0);
        self.current_step_index = Some(first);
        match self.steps.get_mut(first) {
            Some(step) => step.begin(now),
            None => tracing::info!("Every pipeline step is skipped"),
        }
    }

    /// Complete the running step and start the next eligible one
    pub fn advance(&mut self) {
        let Some(index) = self.current_running_index() else {
            tracing::warn!("advance() with no running step");
            return;
        };
        let now = Utc::now();
        self.steps[index].finish(StepStatus::Complete, now);

        let next = self.next_eligible(index + 1);
        self.current_step_index = Some(next);
        if let Some(step) = self.steps.get_mut(next) {
            step.begin(now);
        }
    }

    /// Fail the running step and record the error.
    ///
    /// The error is recorded even when no step is running. Failure also
    /// ends processing.
    pub fn fail(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        let step = self.current_running_index().map(|index| {
            self.steps[index].finish(StepStatus::Failed, now);
            self.steps[index].kind
        });
        self.error = Some(PipelineError {
            step,
            message: message.into(),
        });
        self.stop_clock(now);
    }

    /// Complete the running step, if any, and end processing
    pub fn complete(&mut self) {
        let now = Utc::now();
        if let Some(index) = self.current_running_index() {
            self.steps[index].finish(StepStatus::Complete, now);
        }
        self.stop_clock(now);
    }

    /// Restore the freshly constructed state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Update the progress of one step without touching its status
    pub fn set_progress(&mut self, index: usize, percent: i8) {
        if let Some(step) = self.steps.get_mut(index) {
            step.progress = percent.clamp(PROGRESS_INDETERMINATE, PROGRESS_DONE);
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn current_step_index(&self) -> Option<usize> {
        self.current_step_index
    }

    /// The step the index points at, if it is within range
    pub fn current_step(&self) -> Option<&Step> {
        self.current_step_index.and_then(|index| self.steps.get(index))
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Number of steps currently running
    pub fn running_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Running)
            .count()
    }

    /// True once every step is complete or skipped
    pub fn is_finished(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Complete | StepStatus::Skipped))
    }

    pub fn skipped_kinds(&self) -> impl Iterator<Item = StepKind> + '_ {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Skipped)
            .map(|s| s.kind)
    }

    /// Elapsed processing time; frozen once processing ends
    pub fn elapsed(&self) -> Duration {
        match self.start_time {
            Some(start) => self.end_time.unwrap_or_else(Utc::now) - start,
            None => Duration::zero(),
        }
    }

    /// Overall completion across the steps that actually run (0.0 to 100.0)
    pub fn overall_percent(&self) -> f32 {
        let runnable: Vec<&Step> = self
            .steps
            .iter()
            .filter(|s| s.status != StepStatus::Skipped)
            .collect();
        if runnable.is_empty() {
            return 100.0;
        }
        let done: f32 = runnable
            .iter()
            .map(|s| match s.status {
                StepStatus::Complete => 1.0,
                StepStatus::Running if s.progress > 0 => s.progress as f32 / 100.0,
                _ => 0.0,
            })
            .sum();
        done / runnable.len() as f32 * 100.0
    }

    fn current_running_index(&self) -> Option<usize> {
        self.current_step_index
            .filter(|&index| self.steps.get(index).map(|s| s.status) == Some(StepStatus::Running))
    }

    fn next_eligible(&self, from: usize) -> usize {
        (from..self.steps.len())
            .find(|&index| self.steps[index].status != StepStatus::Skipped)
            .unwrap_or(self.steps.len())
    }

    fn stop_clock(&mut self, now: DateTime<Utc>) {
        self.is_processing = false;
        if self.end_time.is_none() {
            self.end_time = Some(now);
        }
    }
}

impl Default for ProcessingState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(state: &ProcessingState) -> Vec<StepStatus> {
        state.steps().iter().map(|s| s.status).collect()
    }

    #[test]
    fn test_configure_skips_all_combinations() {
        for bits in 0..16u8 {
            let has_audio = bits & 1 != 0;
            let has_screen = bits & 2 != 0;
            let has_webcam = bits & 4 != 0;
            let create_vertical = bits & 8 != 0;

            let mut state = ProcessingState::new();
            state
                .configure_skips(has_audio, has_screen, has_webcam, create_vertical)
                .unwrap();

            let skipped: Vec<StepKind> = state.skipped_kinds().collect();
            let mut expected = Vec::new();
            if !has_audio {
                expected.push(StepKind::Analyzing);
                expected.push(StepKind::Normalizing);
            }
            if !has_screen && !has_webcam {
                expected.push(StepKind::Merging);
            }
            if !create_vertical {
                expected.push(StepKind::Vertical);
            }
            assert_eq!(skipped, expected, "combination {:04b}", bits);
            assert!(state
                .steps()
                .iter()
                .all(|s| s.status == StepStatus::Pending || s.status == StepStatus::Skipped));
        }
    }

    #[test]
    fn test_configure_skips_only_once() {
        let mut state = ProcessingState::new();
        state.configure_skips(true, true, true, true).unwrap();
        assert_eq!(
            state.configure_skips(false, false, false, false),
            Err(PipelineStateError::AlreadyConfigured)
        );
        assert_eq!(state.skipped_kinds().count(), 0);

        let mut started = ProcessingState::new();
        started.start();
        assert_eq!(
            started.configure_skips(false, false, false, false),
            Err(PipelineStateError::AlreadyStarted)
        );
    }

    #[test]
    fn test_start_runs_first_eligible_step() {
        for bits in 0..16u8 {
            let mut state = ProcessingState::new();
            state
                .configure_skips(bits & 1 != 0, bits & 2 != 0, bits & 4 != 0, bits & 8 != 0)
                .unwrap();
            state.start();

            assert!(state.is_processing());
            assert_eq!(state.running_count(), 1);
            // Stopping is never skipped
            assert_eq!(state.current_step_index(), Some(0));
            assert_eq!(state.steps()[0].status, StepStatus::Running);
            assert!(state.steps()[0].start_time.is_some());
        }
    }

    #[test]
    fn test_start_with_every_step_skipped() {
        let mut state = ProcessingState::new();
        for step in &mut state.steps {
            step.status = StepStatus::Skipped;
        }
        state.start();

        assert_eq!(state.running_count(), 0);
        assert_eq!(state.current_step_index(), Some(StepKind::ALL.len()));
        assert!(state.current_step().is_none());
        assert!(state.is_finished());
    }

    #[test]
    fn test_advance_never_runs_two_steps() {
        let mut state = ProcessingState::new();
        state.configure_skips(false, true, false, true).unwrap();
        state.start();

        for _ in 0..8 {
            assert!(state.running_count() <= 1);
            state.advance();
            assert!(state.running_count() <= 1);
        }

        for step in state.steps() {
            if step.status == StepStatus::Complete {
                let (start, end) = (step.start_time.unwrap(), step.end_time.unwrap());
                assert!(end >= start);
            }
        }
        assert_eq!(
            statuses(&state),
            vec![
                StepStatus::Complete,
                StepStatus::Skipped,
                StepStatus::Skipped,
                StepStatus::Complete,
                StepStatus::Complete,
            ]
        );
    }

    #[test]
    fn test_fail_without_running_step_records_error() {
        let mut state = ProcessingState::new();
        state.fail("nothing running");
        assert!(statuses(&state).iter().all(|s| *s == StepStatus::Pending));
        assert_eq!(
            state.error(),
            Some(&PipelineError {
                step: None,
                message: "nothing running".to_string()
            })
        );

        let mut failed = ProcessingState::new();
        failed.start();
        failed.fail("first");
        let before = statuses(&failed);
        failed.fail("second");
        assert_eq!(statuses(&failed), before);
        assert_eq!(failed.error().unwrap().message, "second");
    }

    #[test]
    fn test_fail_clears_processing_and_freezes_elapsed() {
        let mut state = ProcessingState::new();
        state.start();
        state.fail("encoder crashed");

        assert!(!state.is_processing());
        let first = state.elapsed();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(state.elapsed(), first);
    }

    #[test]
    fn test_reset_matches_fresh_state() {
        let mut state = ProcessingState::new();
        state.configure_skips(false, false, true, false).unwrap();
        state.start();
        state.set_progress(0, 40);
        state.advance();
        state.fail("boom");

        state.reset();
        assert_eq!(state, ProcessingState::new());
        // Reset state accepts a new configuration
        assert!(state.configure_skips(true, true, true, true).is_ok());
    }

    #[test]
    fn test_set_progress() {
        let mut state = ProcessingState::new();
        state.start();
        state.set_progress(0, 55);
        assert_eq!(state.steps()[0].progress, 55);
        assert_eq!(state.steps()[0].status, StepStatus::Running);

        state.set_progress(1, 120);
        assert_eq!(state.steps()[1].progress, PROGRESS_DONE);
        assert_eq!(state.steps()[1].status, StepStatus::Pending);

        let before = state.clone();
        state.set_progress(99, 10);
        assert_eq!(state, before);
    }

    #[test]
    fn test_scenario_audio_less_screen_recording() {
        let mut state = ProcessingState::new();
        state.configure_skips(false, true, false, false).unwrap();
        assert_eq!(
            statuses(&state),
            vec![
                StepStatus::Pending,
                StepStatus::Skipped,
                StepStatus::Skipped,
                StepStatus::Pending,
                StepStatus::Skipped,
            ]
        );

        state.start();
        assert_eq!(state.current_step().unwrap().kind, StepKind::Stopping);
        assert_eq!(state.current_step().unwrap().status, StepStatus::Running);
    }

    #[test]
    fn test_scenario_full_capabilities() {
        let mut state = ProcessingState::new();
        state.configure_skips(true, true, true, true).unwrap();
        assert_eq!(state.skipped_kinds().count(), 0);

        state.start();
        for _ in 0..5 {
            state.advance();
        }
        assert!(statuses(&state).iter().all(|s| *s == StepStatus::Complete));
        assert_eq!(state.current_step_index(), Some(5));
        assert!((state.overall_percent() - 100.0).abs() < f32::EPSILON);

        state.complete();
        assert!(!state.is_processing());
    }

    #[test]
    fn test_scenario_failure_midway() {
        let mut state = ProcessingState::new();
        state.configure_skips(true, true, true, true).unwrap();
        state.start();
        state.advance();
        state.advance();
        state.fail("loudnorm exited with status 1");

        assert_eq!(
            statuses(&state),
            vec![
                StepStatus::Complete,
                StepStatus::Complete,
                StepStatus::Failed,
                StepStatus::Pending,
                StepStatus::Pending,
            ]
        );
        let error = state.error().unwrap();
        assert_eq!(error.step, Some(StepKind::Normalizing));
        assert_eq!(
            error.to_string(),
            "Normalizing audio failed: loudnorm exited with status 1"
        );

        // A failed step halts progression
        state.advance();
        assert_eq!(state.steps()[3].status, StepStatus::Pending);
    }
}
