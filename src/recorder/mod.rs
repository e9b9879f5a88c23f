//! Recording session module
//!
//! This module implements the session side of the recorder:
//! - SessionController, the message loop that owns the session state machine
//! - ControllerMessage / UserAction, everything the loop reacts to
//! - SessionView, the context published to the presentation layer

pub mod controller;
pub mod cue;
pub mod messages;
pub mod state;
pub mod view;

pub use controller::{ControllerHandle, SessionController};
pub use cue::{CountdownCue, SilentCue, TerminalBell};
pub use messages::{ControllerMessage, UserAction};
pub use state::{RecordingConfig, Session, SessionState};
pub use view::SessionView;
