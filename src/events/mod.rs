//! Supervisor events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish lifecycle events emitted by the supervisor, the circuit breaker,
//! the concurrency limiter and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`, stamps sequence numbers
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (`command:*`), `CircuitBreaker` (`circuit:change`),
//!   `ConcurrencyLimiter` (`queue:change`), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the supervisor's listener task (fans out to `SubscriberSet`)
//!   and any raw receiver obtained from [`Supervisor::events`](crate::Supervisor::events).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
