//! Error types returned by the supervisor and the process executor.
//!
//! This module defines three error types:
//!
//! - [`SupervisorError`] — the typed failure of one [`execute`](crate::Supervisor::execute) call.
//! - [`SpawnError`] — the OS refused to start the process at all.
//! - [`RuntimeError`] — failures of the supervisor itself, such as a slow shutdown.
//!
//! All provide `as_label` for logs/metrics. [`SupervisorError`] additionally
//! exposes the attached [`CommandResult`] (if any) and [`SupervisorError::is_retryable`].

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::exec::CommandResult;

/// # Errors produced by the supervisor runtime itself.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some processes were still running.
    #[error("shutdown grace {grace:?} exceeded; {active} command(s) still running")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Slots still held when the grace period ran out.
        active: usize,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// # The OS could not start the process.
///
/// Reported for a missing executable, a permission problem or any other
/// `spawn` failure. It is never mixed up with a non-zero exit: a process that
/// never ran has no exit code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to spawn `{command}`: {message}")]
pub struct SpawnError {
    /// Program that was being launched.
    pub command: String,
    /// Classification of the underlying I/O error.
    pub kind: io::ErrorKind,
    /// Text of the underlying I/O error.
    pub message: String,
}

impl SpawnError {
    /// Builds a spawn error from the I/O error returned by `Command::spawn`.
    pub fn from_io(command: impl Into<String>, err: &io::Error) -> Self {
        Self {
            command: command.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// `true` when the executable could not be found.
    pub fn is_not_found(&self) -> bool {
        self.kind == io::ErrorKind::NotFound
    }

    /// `true` when the executable exists but may not be run.
    pub fn is_permission_denied(&self) -> bool {
        self.kind == io::ErrorKind::PermissionDenied
    }
}

/// # Errors produced by [`Supervisor::execute`](crate::Supervisor::execute).
///
/// Every non-success path of an invocation ends in exactly one of these.
/// `Timeout`, `Execution` and `Spawn` are counted as circuit breaker failures;
/// the other variants never reach the process executor.
///
/// The type is `Clone` so that deduplicated callers can each receive the
/// outcome of one shared execution.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum SupervisorError {
    /// The circuit breaker rejected the attempt; no process was spawned.
    #[error("circuit open: command rejected without running")]
    CircuitOpen,

    /// The process exceeded its timeout and was killed.
    ///
    /// Partial output captured before termination is attached.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
        /// Result carrying `timed_out = true` and the partial output.
        result: CommandResult,
    },

    /// The process ran to completion but exited non-zero.
    #[error("exited with code {}", .result.exit_code)]
    Execution {
        /// Full result, including stderr for diagnosis.
        result: CommandResult,
    },

    /// The process could not be started at all.
    #[error(transparent)]
    Spawn(#[from] SpawnError),

    /// The command was still queued when the queue was cleared.
    #[error("cancelled while queued")]
    Cancelled,

    /// The supervisor has been shut down.
    #[error("supervisor is shut down")]
    Shutdown,
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use cmdvisor::SupervisorError;
    ///
    /// assert_eq!(SupervisorError::CircuitOpen.as_label(), "circuit_open");
    /// assert_eq!(SupervisorError::Cancelled.as_label(), "cancelled");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::CircuitOpen => "circuit_open",
            SupervisorError::Timeout { .. } => "timeout",
            SupervisorError::Execution { .. } => "execution_failed",
            SupervisorError::Spawn(_) => "spawn_failed",
            SupervisorError::Cancelled => "cancelled",
            SupervisorError::Shutdown => "shutdown",
        }
    }

    /// Returns the attached [`CommandResult`], if the process ran.
    pub fn result(&self) -> Option<&CommandResult> {
        match self {
            SupervisorError::Timeout { result, .. } | SupervisorError::Execution { result } => {
                Some(result)
            }
            _ => None,
        }
    }

    /// Indicates whether the failure counts against the circuit breaker.
    pub fn is_breaker_failure(&self) -> bool {
        matches!(
            self,
            SupervisorError::Timeout { .. }
                | SupervisorError::Execution { .. }
                | SupervisorError::Spawn(_)
        )
    }

    /// Indicates whether retrying later may succeed without any intervention.
    ///
    /// Returns `true` for [`SupervisorError::CircuitOpen`] and
    /// [`SupervisorError::Timeout`]. A spawn failure needs a setup fix and an
    /// execution failure depends on the command, so both return `false`.
    ///
    /// # Example
    /// ```
    /// use cmdvisor::SupervisorError;
    ///
    /// assert!(SupervisorError::CircuitOpen.is_retryable());
    /// assert!(!SupervisorError::Shutdown.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SupervisorError::CircuitOpen | SupervisorError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: i32) -> CommandResult {
        CommandResult {
            exit_code: code,
            stdout: String::new(),
            stderr: "boom\n".into(),
            duration_ms: 3,
            timed_out: false,
        }
    }

    #[test]
    fn execution_error_carries_result() {
        let err = SupervisorError::Execution { result: result(2) };
        assert_eq!(err.to_string(), "exited with code 2");
        assert_eq!(err.result().map(|r| r.stderr.as_str()), Some("boom\n"));
        assert!(err.is_breaker_failure());
        assert!(!err.is_retryable());
    }

    #[test]
    fn spawn_error_is_distinct() {
        let io = io::Error::new(io::ErrorKind::NotFound, "No such file or directory");
        let err: SupervisorError = SpawnError::from_io("bd", &io).into();
        assert_eq!(err.as_label(), "spawn_failed");
        assert!(err.result().is_none());
        assert!(err.is_breaker_failure());
        match err {
            SupervisorError::Spawn(e) => assert!(e.is_not_found()),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn gate_errors_are_not_breaker_failures() {
        for err in [
            SupervisorError::CircuitOpen,
            SupervisorError::Cancelled,
            SupervisorError::Shutdown,
        ] {
            assert!(!err.is_breaker_failure(), "{}", err.as_label());
        }
    }
}
