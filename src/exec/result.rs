//! # Outcome of one completed invocation.

use std::time::Duration;

/// Exit code reported for a process killed because it exceeded its timeout.
///
/// Real exit codes are `0..=255`, so a negative sentinel cannot be confused with one.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Exit code reported for a process killed because the supervisor shut down.
pub const CANCELLED_EXIT_CODE: i32 = -2;

/// Result of one process invocation.
///
/// Produced once, when the process exits or is killed, and never mutated
/// afterwards. A non-zero `exit_code` or `timed_out = true` is still a
/// `CommandResult`; the supervisor decides how to classify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Process exit code, or [`TIMEOUT_EXIT_CODE`] / [`CANCELLED_EXIT_CODE`].
    pub exit_code: i32,
    /// Everything written to stdout (lossy UTF-8).
    pub stdout: String,
    /// Everything written to stderr (lossy UTF-8).
    pub stderr: String,
    /// Wall-clock time from spawn to exit, in milliseconds.
    pub duration_ms: u64,
    /// `true` when the process was killed for exceeding its timeout.
    pub timed_out: bool,
}

impl CommandResult {
    /// `true` for a process that exited with code `0` before its timeout.
    #[inline]
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Wall-clock duration as a [`Duration`].
    #[inline]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}
