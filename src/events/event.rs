//! # Lifecycle events emitted by a supervisor.
//!
//! The [`EventKind`] enum classifies event types in two groups:
//! - **Supervisor events**: `circuit:change`, `command:start`, `command:complete`,
//!   `command:error`, `queue:change`.
//! - **Subscriber events**: a listener overflowed its queue or panicked.
//!
//! The [`Event`] struct carries the payload as optional fields; which fields
//! are set depends on the kind (documented per variant).
//!
//! ## Ordering guarantees
//! Every event published on a [`Bus`](super::Bus) gets a sequence number (`seq`)
//! that increases monotonically per supervisor.
//!
//! ## Example
//! ```rust
//! use cmdvisor::{CircuitState, Event, EventKind};
//!
//! let ev = Event::new(EventKind::CircuitChange)
//!     .with_transition(CircuitState::Closed, CircuitState::Open);
//!
//! assert_eq!(ev.kind.as_str(), "circuit:change");
//! assert_eq!(ev.to, Some(CircuitState::Open));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::breaker::CircuitState;
use crate::error::SupervisorError;
use crate::exec::CommandResult;

/// Classification of supervisor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The circuit breaker changed state.
    ///
    /// Sets:
    /// - `from`, `to`: previous and new state
    CircuitChange,

    /// A command acquired a slot and its process is about to be launched.
    ///
    /// Sets:
    /// - `id`: invocation id
    /// - `command`, `args`
    CommandStart,

    /// A command exited with code 0 before its timeout.
    ///
    /// Sets:
    /// - `id`, `command`, `args`
    /// - `result`: the [`CommandResult`]
    CommandComplete,

    /// A command failed (rejected, cancelled, spawn error, timeout or non-zero exit).
    ///
    /// Sets:
    /// - `id`, `command`, `args`
    /// - `error`: the [`SupervisorError`]
    /// - `result`: set when the process ran
    CommandError,

    /// The number of queued (not yet started) commands changed.
    ///
    /// Sets:
    /// - `queue_size`: size after the change
    QueueChange,

    /// A subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,

    /// A subscriber panicked while handling an event.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,
}

impl EventKind {
    /// All supervisor event kinds (subscriber diagnostics excluded).
    pub const SUPERVISOR: [EventKind; 5] = [
        EventKind::CircuitChange,
        EventKind::CommandStart,
        EventKind::CommandComplete,
        EventKind::CommandError,
        EventKind::QueueChange,
    ];

    /// Stable wire name, e.g. `"command:start"`.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::CircuitChange => "circuit:change",
            EventKind::CommandStart => "command:start",
            EventKind::CommandComplete => "command:complete",
            EventKind::CommandError => "command:error",
            EventKind::QueueChange => "queue:change",
            EventKind::SubscriberOverflow => "subscriber:overflow",
            EventKind::SubscriberPanicked => "subscriber:panicked",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supervisor event with optional payload.
#[derive(Clone, Debug)]
pub struct Event {
    /// Per-supervisor sequence number (assigned by the bus on publish).
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Invocation id.
    pub id: Option<u64>,
    /// Program name.
    pub command: Option<Arc<str>>,
    /// Program arguments.
    pub args: Option<Arc<[String]>>,
    /// Outcome of a process that ran.
    pub result: Option<Arc<CommandResult>>,
    /// Failure reported to the caller.
    pub error: Option<SupervisorError>,
    /// Circuit state before a transition.
    pub from: Option<CircuitState>,
    /// Circuit state after a transition.
    pub to: Option<CircuitState>,
    /// Queue size after a change.
    pub queue_size: Option<usize>,
    /// Subscriber name (subscriber events only).
    pub subscriber: Option<&'static str>,
    /// Human-readable detail (subscriber events only).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: 0,
            at: SystemTime::now(),
            kind,
            id: None,
            command: None,
            args: None,
            result: None,
            error: None,
            from: None,
            to: None,
            queue_size: None,
            subscriber: None,
            reason: None,
        }
    }

    /// Attaches the invocation id.
    #[inline]
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Attaches the command line.
    #[inline]
    pub fn with_command(mut self, command: impl Into<Arc<str>>, args: Arc<[String]>) -> Self {
        self.command = Some(command.into());
        self.args = Some(args);
        self
    }

    /// Attaches a process result.
    #[inline]
    pub fn with_result(mut self, result: CommandResult) -> Self {
        self.result = Some(Arc::new(result));
        self
    }

    /// Attaches an error, and its result when the process ran.
    #[inline]
    pub fn with_error(mut self, error: SupervisorError) -> Self {
        if let Some(r) = error.result() {
            self.result = Some(Arc::new(r.clone()));
        }
        self.error = Some(error);
        self
    }

    /// Attaches a circuit transition.
    #[inline]
    pub fn with_transition(mut self, from: CircuitState, to: CircuitState) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Attaches the queue size.
    #[inline]
    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = Some(size);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow);
        ev.subscriber = Some(subscriber);
        ev.reason = Some(reason.into());
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked);
        ev.subscriber = Some(subscriber);
        ev.reason = Some(info.into());
        ev
    }

    /// `true` for events about subscribers themselves.
    #[inline]
    pub fn is_subscriber_diagnostic(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_event_carries_attached_result() {
        let result = CommandResult {
            exit_code: 1,
            stdout: String::new(),
            stderr: "no such issue\n".into(),
            duration_ms: 4,
            timed_out: false,
        };
        let ev = Event::new(EventKind::CommandError)
            .with_id(7)
            .with_command("bd", Arc::from(vec!["show".to_string()]))
            .with_error(SupervisorError::Execution { result });

        assert_eq!(ev.id, Some(7));
        assert_eq!(ev.command.as_deref(), Some("bd"));
        assert_eq!(ev.result.as_ref().map(|r| r.exit_code), Some(1));
        assert_eq!(ev.error.as_ref().map(|e| e.as_label()), Some("execution_failed"));
    }

    #[test]
    fn wire_names() {
        let names: Vec<_> = EventKind::SUPERVISOR.iter().map(|k| k.as_str()).collect();
        assert_eq!(
            names,
            [
                "circuit:change",
                "command:start",
                "command:complete",
                "command:error",
                "queue:change"
            ]
        );
        assert!(Event::subscriber_overflow("log", "full").is_subscriber_diagnostic());
    }
}
