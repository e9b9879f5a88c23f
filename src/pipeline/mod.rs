//! Post-processing pipeline
//!
//! This module implements what happens after a recording stops:
//! - `state`: the step ledger
//! - `events`: progress messages emitted by the worker
//! - `driver`: the background worker and its progress sink
//! - `relay`: the single consumer that applies events to the ledger

pub mod driver;
pub mod events;
pub mod relay;
pub mod state;

pub use driver::{PipelineDriver, PipelineRun, PlannedStep, ProgressSink};
pub use events::{ProgressEvent, ProgressKind};
pub use relay::{ProgressRelay, RelayNotification};
pub use state::{PipelineError, ProcessingState, Step, StepKind, StepStatus};
