//! Progress events
//!
//! Messages emitted by the background pipeline worker, one per step
//! transition or percent update.

use serde::{Deserialize, Serialize};

/// What happened to a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ProgressKind {
    /// The step began
    Started,
    /// The step reported a new percentage
    PercentUpdate { percent: i8 },
    /// The step was excluded by the session's capabilities
    Skipped,
    /// The step failed
    Failed { message: String },
    /// The step finished successfully
    Completed,
}

/// A state transition or percent update for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub step_index: usize,
    pub kind: ProgressKind,
}

impl ProgressEvent {
    pub fn started(step_index: usize) -> Self {
        Self {
            step_index,
            kind: ProgressKind::Started,
        }
    }

    /// Percent update; fractional values from encoders are rounded down
    pub fn percent(step_index: usize, percent: f32) -> Self {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0) as i8
        } else {
            0
        };
        Self {
            step_index,
            kind: ProgressKind::PercentUpdate { percent },
        }
    }

    pub fn skipped(step_index: usize) -> Self {
        Self {
            step_index,
            kind: ProgressKind::Skipped,
        }
    }

    pub fn failed(step_index: usize, message: impl Into<String>) -> Self {
        Self {
            step_index,
            kind: ProgressKind::Failed {
                message: message.into(),
            },
        }
    }

    pub fn completed(step_index: usize) -> Self {
        Self {
            step_index,
            kind: ProgressKind::Completed,
        }
    }

    /// Whether this event concludes its step
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            ProgressKind::Skipped | ProgressKind::Failed { .. } | ProgressKind::Completed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_is_clamped() {
        assert_eq!(
            ProgressEvent::percent(1, 42.9).kind,
            ProgressKind::PercentUpdate { percent: 42 }
        );
        assert_eq!(
            ProgressEvent::percent(1, 250.0).kind,
            ProgressKind::PercentUpdate { percent: 100 }
        );
        assert_eq!(
            ProgressEvent::percent(1, f32::NAN).kind,
            ProgressKind::PercentUpdate { percent: 0 }
        );
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(!ProgressEvent::started(0).is_terminal());
        assert!(!ProgressEvent::percent(0, 10.0).is_terminal());
        assert!(ProgressEvent::skipped(0).is_terminal());
        assert!(ProgressEvent::failed(0, "x").is_terminal());
        assert!(ProgressEvent::completed(0).is_terminal());
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(ProgressEvent::failed(2, "disk full")).unwrap();
        assert_eq!(json["stepIndex"], 2);
        assert_eq!(json["kind"]["type"], "failed");
        assert_eq!(json["kind"]["message"], "disk full");
    }
}
