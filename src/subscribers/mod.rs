//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] that
//! fans events out to subscribers, and built-in implementations.
//!
//! ## Architecture
//! ```text
//! Supervisor ── publish(Event) ──► Bus ──► listener task ──► SubscriberSet::emit(&Event)
//!                                                                 │
//!                                                    ┌────────────┼────────────┐
//!                                                    ▼            ▼            ▼
//!                                                LogWriter     Listener     Custom
//! ```
//!
//! ## Subscriber types
//! - [`Listener`]: closure bound to one event kind (what `Supervisor::on` registers)
//! - [`LogWriter`]: renders events as `tracing` records (feature `logging`)
//! - anything implementing [`Subscribe`]

#[cfg(feature = "logging")]
mod log;
mod listener;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use listener::Listener;
pub use subscriber::Subscribe;
pub use subscriber_set::{SubscriberSet, SubscriptionId};
