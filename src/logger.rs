//! Hierarchical enter/exit tracing for debugging machine flow.
//!
//! A [`StateLogger`] captures an ordered, timestamped record of every
//! state entry and exit a machine commits, across all nesting levels.
//! Attaching one to a machine (see `Machine::attach_logger`) hands the
//! machine a depth-0 [`LayerLog`] handle and walks its registry so each
//! nested machine records one level deeper. The captured trace can be
//! inspected in order or exported as JSON; every record is also mirrored
//! to `tracing` at trace level.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// Whether a record marks a state entry or exit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum LogEventKind {
    Enter,
    Exit,
}

/// One captured entry/exit record.
#[derive(Clone, Debug, Serialize)]
pub struct LogEvent {
    /// When the record was captured.
    pub timestamp: DateTime<Utc>,
    /// Nesting depth of the machine that committed the change; the machine
    /// the logger was attached to records at depth 0.
    pub depth: usize,
    pub kind: LogEventKind,
    /// Name of the state entered or exited.
    pub state: &'static str,
}

type Sink = Arc<Mutex<Vec<LogEvent>>>;

fn push(sink: &Sink, event: LogEvent) {
    sink.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(event);
}

/// Owner of a captured trace.
///
/// # Example
///
/// ```rust
/// use stateflow::{State, StateLogger, StateMachine, Transition};
///
/// let mut machine = StateMachine::new("doors");
/// machine.add_state(State::new("Closed"));
/// machine.add_state(State::new("Open"));
/// machine.add_transition(Transition::new("Closed", "Open", 1));
///
/// let logger = StateLogger::new();
/// machine.attach_logger(&logger);
///
/// machine.init().unwrap();
/// machine.update();
///
/// let events = logger.events();
/// assert!(!events.is_empty());
/// assert_eq!(events[0].state, "Closed");
/// ```
#[derive(Clone, Debug)]
pub struct StateLogger {
    sink: Sink,
}

impl StateLogger {
    /// Create a logger with an empty trace.
    pub fn new() -> Self {
        Self {
            sink: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The depth-0 handle machines record through.
    pub fn layer_log(&self) -> LayerLog {
        LayerLog {
            sink: Arc::clone(&self.sink),
            depth: 0,
        }
    }

    /// Snapshot of the captured records, in capture order.
    pub fn events(&self) -> Vec<LogEvent> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Export the captured records as a JSON array.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.events())
    }

    /// Discard the captured records.
    pub fn reset(&self) {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for StateLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Recording handle at one nesting depth, cheap to clone.
#[derive(Clone, Debug)]
pub struct LayerLog {
    sink: Sink,
    depth: usize,
}

impl LayerLog {
    /// A handle recording one nesting level deeper, for a nested machine.
    pub fn sub_layer(&self) -> LayerLog {
        LayerLog {
            sink: Arc::clone(&self.sink),
            depth: self.depth + 1,
        }
    }

    /// Nesting depth this handle records at.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn log_enter(&self, state: &'static str) {
        tracing::trace!(state, depth = self.depth, "state entered");
        push(
            &self.sink,
            LogEvent {
                timestamp: Utc::now(),
                depth: self.depth,
                kind: LogEventKind::Enter,
                state,
            },
        );
    }

    pub(crate) fn log_exit(&self, state: &'static str) {
        tracing::trace!(state, depth = self.depth, "state exited");
        push(
            &self.sink,
            LogEvent {
                timestamp: Utc::now(),
                depth: self.depth,
                kind: LogEventKind::Exit,
                state,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_captured_in_order() {
        let logger = StateLogger::new();
        let log = logger.layer_log();

        log.log_enter("Idle");
        log.log_exit("Idle");
        log.log_enter("Run");

        let events = logger.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, LogEventKind::Enter);
        assert_eq!(events[0].state, "Idle");
        assert_eq!(events[1].kind, LogEventKind::Exit);
        assert_eq!(events[2].state, "Run");
    }

    #[test]
    fn sub_layer_records_one_level_deeper() {
        let logger = StateLogger::new();
        let root = logger.layer_log();
        let nested = root.sub_layer();

        assert_eq!(root.depth(), 0);
        assert_eq!(nested.depth(), 1);
        assert_eq!(nested.sub_layer().depth(), 2);

        root.log_enter("Outer");
        nested.log_enter("Inner");

        let events = logger.events();
        assert_eq!(events[0].depth, 0);
        assert_eq!(events[1].depth, 1);
    }

    #[test]
    fn reset_discards_captured_records() {
        let logger = StateLogger::new();
        logger.layer_log().log_enter("Idle");
        assert_eq!(logger.events().len(), 1);

        logger.reset();
        assert!(logger.events().is_empty());
    }

    #[test]
    fn trace_exports_as_json() {
        let logger = StateLogger::new();
        logger.layer_log().log_enter("Idle");

        let json = logger.to_json().unwrap();
        assert!(json.contains("\"Idle\""));
        assert!(json.contains("\"Enter\""));
    }

    #[test]
    fn handles_share_one_sink() {
        let logger = StateLogger::new();
        let a = logger.layer_log();
        let b = a.clone();

        a.log_enter("X");
        b.log_exit("X");
        assert_eq!(logger.events().len(), 2);
    }
}
