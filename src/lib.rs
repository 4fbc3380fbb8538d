//! # cmdvisor
//!
//! **Cmdvisor** supervises invocations of an external command-line program.
//!
//! Every call goes through a circuit breaker (so a broken tool fails fast
//! instead of being hammered), a concurrency limiter with a FIFO queue (so a
//! burst of requests never spawns more than `max_concurrent` processes) and a
//! direct-exec process executor with a hard timeout. Each invocation returns a
//! typed result or error and publishes lifecycle events to subscribers.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   execute("bd", ["show", "42"])     execute(...)     execute(...)
//!            │                             │                │
//!            ▼                             ▼                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (one per wrapped tool)                                │
//! │  - dedup map (identical in-flight requests share one run)         │
//! │  - CircuitBreaker  (closed / open / half-open)                    │
//! │  - ConcurrencyLimiter (slots + FIFO queue)                        │
//! │  - Executor (ProcessExecutor: tokio::process, no shell)           │
//! │  - SubscriberSet (fans out to listeners)                          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        │ circuit:change   │ queue:change     │ command:start/complete/error
//!        ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │              (capacity: SupervisorConfig::bus_capacity)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                            (per-sub queues)
//!                         ┌─────────┼─────────┐
//!                         ▼         ▼         ▼
//!                      worker1   worker2   workerN
//! ```
//!
//! ### Lifecycle of one invocation
//! ```text
//! execute(cmd, args)
//!   ├─► shut down?              ─► Err(Shutdown)
//!   ├─► breaker.admit()         ─► Err(CircuitOpen)   (no process spawned)
//!   ├─► limiter.acquire()       ─► queue:change, waits in FIFO order
//!   │                              Err(Cancelled) on clear_queue()
//!   ├─► publish command:start
//!   ├─► executor.run()          ─► exit 0          → Ok(CommandResult)
//!   │                              exit != 0       → Err(Execution)
//!   │                              timeout         → Err(Timeout), partial output attached
//!   │                              spawn failed    → Err(Spawn)
//!   ├─► breaker.record(outcome) ─► circuit:change on transition
//!   ├─► release slot            ─► next queued command starts
//!   └─► publish command:complete | command:error
//! ```
//!
//! ## Features
//! | Area              | Description                                                     | Key types / traits                        |
//! |-------------------|-----------------------------------------------------------------|-------------------------------------------|
//! | **Supervision**   | Gate, queue and run external commands.                          | [`Supervisor`], [`SupervisorBuilder`]     |
//! | **Failure isolation** | Three-state circuit breaker.                                | [`CircuitBreaker`], [`CircuitState`]      |
//! | **Concurrency**   | Slot limit with a FIFO backlog.                                 | [`ConcurrencyLimiter`], [`QueueTicket`]   |
//! | **Execution**     | Direct-exec processes with timeout and output capture.          | [`Executor`], [`ProcessExecutor`]         |
//! | **Subscriber API**| Hook into lifecycle events (logging, UI state, tests).          | [`Subscribe`], [`Listener`]               |
//! | **Errors**        | Typed failures distinguishing setup problems from flaky runs.   | [`SupervisorError`], [`SpawnError`]       |
//! | **Configuration** | Centralize runtime settings.                                    | [`SupervisorConfig`], [`ExecOptions`]     |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], a subscriber rendering events through `tracing`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use cmdvisor::{EventKind, ExecOptions, Supervisor, SupervisorConfig, SupervisorError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = SupervisorConfig::default();
//!     cfg.max_concurrent = 2;
//!     cfg.circuit_breaker.threshold = 3;
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn cmdvisor::Subscribe>> = vec![Arc::new(cmdvisor::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn cmdvisor::Subscribe>> = Vec::new();
//!
//!     let sup = Supervisor::builder(cfg).with_subscribers(subs).build();
//!     sup.on(EventKind::CircuitChange, |ev| {
//!         eprintln!("circuit {:?} -> {:?}", ev.from, ev.to);
//!     });
//!
//!     match sup
//!         .execute_with("git", ["status", "--short"], ExecOptions::with_timeout(Duration::from_secs(5)))
//!         .await
//!     {
//!         Ok(out) => print!("{}", out.stdout),
//!         Err(SupervisorError::Spawn(e)) if e.is_not_found() => eprintln!("git is not installed"),
//!         Err(e) => eprintln!("git failed: {e}"),
//!     }
//!
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod breaker;
mod core;
mod error;
mod events;
mod exec;
mod limiter;
mod subscribers;

pub use breaker::{Admission, BreakerConfig, CircuitBreaker, CircuitState};
pub use core::{ExecOptions, Supervisor, SupervisorBuilder, SupervisorConfig, SupervisorStats};
pub use error::{RuntimeError, SpawnError, SupervisorError};
pub use events::{Bus, Event, EventKind};
pub use exec::{
    CANCELLED_EXIT_CODE, CommandResult, ExecEnv, ExecRequest, Executor, ExecutorRef,
    ProcessExecutor, TIMEOUT_EXIT_CODE,
};
pub use limiter::{ConcurrencyLimiter, PendingCommand, QueueTicket, SlotPermit};
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
pub use subscribers::{Listener, Subscribe, SubscriberSet, SubscriptionId};
