//! # LogWriter — events as `tracing` records
//!
//! A subscriber that renders every [`Event`] as a structured `tracing` record
//! under the `cmdvisor::events` target. Install any `tracing` subscriber
//! (e.g. `tracing_subscriber::fmt`) to see them.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO cmdvisor::events: command:start id=3 command="bd" args=["list"]
//! INFO cmdvisor::events: command:complete id=3 command="bd" exit_code=0 duration_ms=41
//! WARN cmdvisor::events: command:error id=4 command="gt" error=exited with code 1
//! WARN cmdvisor::events: circuit:change from=closed to=open
//! DEBUG cmdvisor::events: queue:change size=2
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let command = e.command.as_deref().unwrap_or("");
        match e.kind {
            EventKind::CommandStart => {
                tracing::info!(target: "cmdvisor::events", id = ?e.id, command, args = ?e.args, "command:start");
            }
            EventKind::CommandComplete => {
                let (exit_code, duration_ms) = e
                    .result
                    .as_ref()
                    .map_or((None, None), |r| (Some(r.exit_code), Some(r.duration_ms)));
                tracing::info!(target: "cmdvisor::events", id = ?e.id, command, ?exit_code, ?duration_ms, "command:complete");
            }
            EventKind::CommandError => {
                let error = e.error.as_ref().map(ToString::to_string);
                tracing::warn!(target: "cmdvisor::events", id = ?e.id, command, error = error.as_deref().unwrap_or("unknown"), "command:error");
            }
            EventKind::CircuitChange => {
                tracing::warn!(
                    target: "cmdvisor::events",
                    from = e.from.map(|s| s.as_str()).unwrap_or("?"),
                    to = e.to.map(|s| s.as_str()).unwrap_or("?"),
                    "circuit:change"
                );
            }
            EventKind::QueueChange => {
                tracing::debug!(target: "cmdvisor::events", size = ?e.queue_size, "queue:change");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                tracing::warn!(
                    target: "cmdvisor::events",
                    subscriber = e.subscriber.unwrap_or("unknown"),
                    reason = e.reason.as_deref().unwrap_or("unknown"),
                    "{}",
                    e.kind
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
