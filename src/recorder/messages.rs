//! Messages delivered to the session controller loop

use super::state::RecordingConfig;
use crate::pipeline::RelayNotification;
use crate::sentinel::SentinelChange;
use uuid::Uuid;

/// Actions coming from the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    /// Start the countdown for a new recording
    NewRecording(RecordingConfig),
    /// Stop the active recording and process it
    Stop,
    /// Abort the countdown
    Cancel,
    /// Leave the application
    Quit,
}

/// Everything the controller reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerMessage {
    User(UserAction),
    /// One second of countdown elapsed for the given session
    CountdownTick { session_id: Uuid },
    /// Progress relay output
    Pipeline(RelayNotification),
    /// The completion hold for the given session ended
    CompleteHoldElapsed { session_id: Uuid },
    /// Capture activity outside this program changed
    ExternalRecording(SentinelChange),
}

impl From<UserAction> for ControllerMessage {
    fn from(action: UserAction) -> Self {
        ControllerMessage::User(action)
    }
}

impl From<RelayNotification> for ControllerMessage {
    fn from(notification: RelayNotification) -> Self {
        ControllerMessage::Pipeline(notification)
    }
}

impl From<SentinelChange> for ControllerMessage {
    fn from(change: SentinelChange) -> Self {
        ControllerMessage::ExternalRecording(change)
    }
}
