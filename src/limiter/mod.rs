//! Concurrency limiter and FIFO command queue.
//!
//! ## Contents
//! - [`ConcurrencyLimiter`] bounds running processes and owns the backlog
//! - [`SlotPermit`] RAII slot; dropping it releases the slot
//! - [`QueueTicket`] deferred handle for a queued command
//! - [`PendingCommand`] read-only view of a queued entry
//!
//! ## Rules
//! - `active_count()` never exceeds the limit.
//! - Queued entries are granted strictly in submission order; a released
//!   slot is handed to the front entry before any newcomer can take it.
//! - Every queued entry is resolved exactly once: granted, cancelled by
//!   `clear()`, or withdrawn when its ticket is dropped.
//! - Every change of the backlog size publishes `queue:change`.

mod queue;
mod slots;

pub use queue::{PendingCommand, QueueTicket};
pub use slots::{ConcurrencyLimiter, SlotPermit};
