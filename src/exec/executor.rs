//! # Executor abstraction.
//!
//! [`Executor`] is the seam between the supervisor and the operating system.
//! The supervisor owns breaker, limiter and events; the executor only runs
//! one invocation and reports what happened. [`ProcessExecutor`](super::ProcessExecutor)
//! is the real implementation; tests and sandboxes can plug in their own.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SpawnError;
use crate::exec::CommandResult;

/// One invocation handed to an [`Executor`].
#[derive(Clone, Debug)]
pub struct ExecRequest {
    /// Program to launch (resolved via `PATH` when it has no separator).
    pub command: String,
    /// Arguments, each passed to the program as a discrete token.
    pub args: Vec<String>,
    /// Wall-clock limit (`None` = run until exit).
    pub timeout: Option<Duration>,
    /// Fires when the supervisor shuts down; the process must be killed.
    pub cancel: CancellationToken,
}

/// # Runs exactly one external program invocation.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use cmdvisor::{CommandResult, ExecRequest, Executor, SpawnError};
///
/// struct Canned;
///
/// #[async_trait]
/// impl Executor for Canned {
///     async fn run(&self, req: ExecRequest) -> Result<CommandResult, SpawnError> {
///         Ok(CommandResult {
///             exit_code: 0,
///             stdout: format!("{} {}\n", req.command, req.args.join(" ")),
///             stderr: String::new(),
///             duration_ms: 0,
///             timed_out: false,
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Runs `req` to completion, timeout or cancellation.
    ///
    /// Returns `Err` only when the process could not be started. Every process
    /// that did start yields a [`CommandResult`], whatever its exit status.
    async fn run(&self, req: ExecRequest) -> Result<CommandResult, SpawnError>;
}

/// Shared handle to an executor.
pub type ExecutorRef = Arc<dyn Executor>;
