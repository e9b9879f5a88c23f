//! Presentation context
//!
//! Snapshot of everything a renderer needs, published by the controller
//! after every message it handles.

use super::state::{Session, SessionState};
use crate::pipeline::ProcessingState;
use crate::utils::ErrorResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// What the front end renders
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session_id: Uuid,
    pub state: SessionState,

    /// Seconds left, while counting down
    pub countdown_remaining: Option<u32>,

    pub recording_started_at: Option<DateTime<Utc>>,
    pub output_dir: Option<PathBuf>,

    /// Pipeline ledger as last reported by the relay
    pub processing: ProcessingState,

    /// The pipeline succeeded and the view is holding before going idle
    pub pipeline_complete: bool,

    /// Error to show in place, if any
    pub error: Option<ErrorResponse>,

    /// Capture activity outside this program
    pub external_recording: bool,
    pub external_pids: Vec<u32>,
}

impl SessionView {
    pub(crate) fn build(
        session: &Session,
        processing: &ProcessingState,
        error: Option<&ErrorResponse>,
        external_pids: &[u32],
    ) -> Self {
        Self {
            session_id: session.id,
            state: session.state,
            countdown_remaining: (session.state == SessionState::Countdown)
                .then_some(session.countdown_remaining),
            recording_started_at: session.recording_started_at,
            output_dir: session.output_dir().cloned(),
            processing: processing.clone(),
            pipeline_complete: session.completing,
            error: error.cloned(),
            external_recording: !external_pids.is_empty(),
            external_pids: external_pids.to_vec(),
        }
    }

    /// Whether only quitting is possible
    pub fn is_stuck_on_failure(&self) -> bool {
        self.state == SessionState::Processing && self.processing.has_failed()
    }
}

impl Default for SessionView {
    fn default() -> Self {
        Self::build(&Session::idle(), &ProcessingState::new(), None, &[])
    }
}
