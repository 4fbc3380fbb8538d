//! Process execution: one OS process per invocation.
//!
//! ## Contents
//! - [`CommandResult`] immutable outcome of one completed invocation
//! - [`Executor`] the seam between the supervisor and the OS
//! - [`ProcessExecutor`] direct-exec implementation on top of `tokio::process`
//! - [`ExecEnv`] environment handed to the child process
//!
//! ## Rules
//! - No shell: the program is launched directly and every argument is an opaque token.
//! - stdout and stderr are buffered independently and returned whole.
//! - A process that outlives its timeout is killed; its result carries `timed_out = true`.
//! - Failing to start the process is a [`SpawnError`](crate::SpawnError), never a result.

mod env;
mod executor;
mod process;
mod result;

pub use env::ExecEnv;
pub use executor::{ExecRequest, Executor, ExecutorRef};
pub use process::ProcessExecutor;
pub use result::{CANCELLED_EXIT_CODE, CommandResult, TIMEOUT_EXIT_CODE};
