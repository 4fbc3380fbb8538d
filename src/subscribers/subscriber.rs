//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], the extension point for plugging observers
//! (logging, UI state, metrics, tests) into a supervisor.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently of the supervisor)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `subscriber:panicked`)
//! - **Kind filter** ([`Subscribe::accepts`]); rejected events never enter the queue
//!
//! ## Rules
//! - Events are delivered in emission order per subscriber.
//! - A slow subscriber only affects its own queue; on overflow the event is
//!   dropped for that subscriber and `subscriber:overflow` is published.
//! - Nothing a subscriber does can change supervisor state.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use cmdvisor::{Event, EventKind, Subscribe};
//!
//! struct Failures;
//!
//! #[async_trait]
//! impl Subscribe for Failures {
//!     async fn on_event(&self, ev: &Event) {
//!         if let Some(err) = &ev.error {
//!             eprintln!("{:?} failed: {err}", ev.command);
//!         }
//!     }
//!
//!     fn accepts(&self, kind: EventKind) -> bool { kind == EventKind::CommandError }
//!     fn name(&self) -> &'static str { "failures" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Observer of supervisor events.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally. A panic is caught, but it is still a bug.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, called from the subscriber's worker task.
    async fn on_event(&self, event: &Event);

    /// Returns `true` for event kinds this subscriber wants.
    ///
    /// Default: every kind.
    fn accepts(&self, _kind: EventKind) -> bool {
        true
    }

    /// Returns the subscriber name used in logs and overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (min 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
