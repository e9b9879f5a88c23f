//! Audible countdown cues

use std::io::Write;

/// Played on each non-zero countdown tick
pub trait CountdownCue: Send {
    fn tick(&self, remaining: u32);
}

/// Rings the terminal bell
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalBell;

impl CountdownCue for TerminalBell {
    fn tick(&self, remaining: u32) {
        let mut stderr = std::io::stderr();
        if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            tracing::debug!("Countdown cue at {} failed: {}", remaining, e);
        }
    }
}

/// No sound
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentCue;

impl CountdownCue for SilentCue {
    fn tick(&self, _remaining: u32) {}
}
