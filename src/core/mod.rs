//! Runtime core: the supervisor facade and its invocation pipeline.
//!
//! The public API of this module is [`Supervisor`] (with [`SupervisorBuilder`]),
//! its configuration types and [`SupervisorStats`].
//!
//! Internal modules:
//! - [`runner`]: runs one invocation through breaker, limiter and executor, publishing events;
//! - [`supervisor`]: owns the components, deduplicates in-flight requests, handles shutdown;
//! - [`builder`]: wires subscribers and the executor;
//! - [`config`]: configuration and per-call options.

mod builder;
mod config;
mod runner;
mod stats;
mod supervisor;

#[cfg(test)]
mod tests;

pub use builder::SupervisorBuilder;
pub use config::{ExecOptions, SupervisorConfig};
pub use stats::SupervisorStats;
pub use supervisor::Supervisor;
