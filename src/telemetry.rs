//! Telemetry utilities for command timing and dispatch spans.

use std::time::Instant;

/// Guard for timing command execution.
///
/// Logs command latency at debug level when dropped.
pub struct CommandTimer {
    command: String,
    start: Instant,
}

impl CommandTimer {
    /// Start timing a command.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(command = %self.command, elapsed_ms, "command finished");
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, debug_span, info_span};

    /// Create a span for one connection session.
    pub fn session(url: &str) -> Span {
        info_span!("session", url = %url)
    }

    /// Create a span for dispatching one protocol event.
    pub fn event(kind: &str, room: Option<&str>) -> Span {
        if let Some(room) = room {
            debug_span!("event", kind = %kind, room = %room)
        } else {
            debug_span!("event", kind = %kind)
        }
    }

    /// Create a span for a command execution.
    pub fn command(name: &str, caller: &str, room: Option<&str>) -> Span {
        if let Some(room) = room {
            info_span!("command", name = %name, caller = %caller, room = %room)
        } else {
            info_span!("command", name = %name, caller = %caller)
        }
    }
}
