//! # Direct-exec process runner.
//!
//! [`ProcessExecutor`] launches the program with `tokio::process::Command`
//! (no shell), buffers stdout and stderr on dedicated reader tasks and races
//! the child's exit against the timeout and the shutdown token.
//!
//! ## Flow
//! ```text
//! spawn ──► readers(stdout, stderr) ──► select!
//!                                         ├─ child exits     ─► exit code
//!                                         ├─ timeout elapses ─► kill, TIMEOUT_EXIT_CODE, timed_out
//!                                         └─ cancel fires    ─► kill, CANCELLED_EXIT_CODE
//!           ──► drain readers (bounded by DRAIN_GRACE) ──► CommandResult
//! ```
//!
//! ## Rules
//! - Spawn failure returns [`SpawnError`]; everything after a successful spawn returns a result.
//! - Output captured before a kill is kept.
//! - On unix the child leads its own process group; a kill reaches everything it spawned.
//! - Readers are bounded by [`DRAIN_GRACE`] after exit: a grandchild holding the pipe
//!   open cannot stall the caller.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::error::SpawnError;
use crate::exec::{
    CANCELLED_EXIT_CODE, CommandResult, ExecEnv, ExecRequest, Executor, TIMEOUT_EXIT_CODE,
};

/// How long to keep reading pipes after the child is gone.
pub const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Runs programs as real OS processes.
#[derive(Clone, Debug, Default)]
pub struct ProcessExecutor {
    env: ExecEnv,
}

impl ProcessExecutor {
    /// Creates an executor that applies `env` to every child.
    pub fn new(env: ExecEnv) -> Self {
        Self { env }
    }

    /// The environment applied to children.
    pub fn env(&self) -> &ExecEnv {
        &self.env
    }
}

/// Why the wait loop ended.
enum Exit {
    Status(ExitStatus),
    TimedOut,
    Cancelled,
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn run(&self, req: ExecRequest) -> Result<CommandResult, SpawnError> {
        let mut cmd = Command::new(&req.command);
        cmd.args(&req.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        self.env.apply(&mut cmd);

        let started = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(&req.command, &e))?;
        tracing::debug!(command = %req.command, pid = ?child.id(), "process spawned");

        let stdout = child.stdout.take().map(Capture::start);
        let stderr = child.stderr.take().map(Capture::start);

        let deadline = async {
            match req.timeout.filter(|d| *d > Duration::ZERO) {
                Some(d) => time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        let exit = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => Exit::Status(status),
                Err(e) => return Err(SpawnError::from_io(&req.command, &e)),
            },
            _ = deadline => Exit::TimedOut,
            _ = req.cancel.cancelled() => Exit::Cancelled,
        };

        let (exit_code, timed_out) = match exit {
            Exit::Status(status) => (exit_code(status), false),
            Exit::TimedOut => {
                tracing::warn!(command = %req.command, timeout = ?req.timeout, "process timed out; killing");
                kill(&mut child).await;
                (TIMEOUT_EXIT_CODE, true)
            }
            Exit::Cancelled => {
                tracing::debug!(command = %req.command, "process cancelled; killing");
                kill(&mut child).await;
                (CANCELLED_EXIT_CODE, false)
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let stdout = match stdout {
            Some(c) => c.finish().await,
            None => String::new(),
        };
        let stderr = match stderr {
            Some(c) => c.finish().await,
            None => String::new(),
        };

        tracing::debug!(command = %req.command, exit_code, duration_ms, timed_out, "process finished");
        Ok(CommandResult {
            exit_code,
            stdout,
            stderr,
            duration_ms,
            timed_out,
        })
    }
}

/// Kills the child (and on unix its process group) and reaps it.
async fn kill(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            tracing::debug!(pid, error = %e, "killpg failed");
        }
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "kill failed (process already gone?)");
    }
    let _ = child.wait().await;
}

/// Maps an exit status to an integer code; signal deaths become `128 + signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    -1
}

/// Background reader that buffers one pipe.
struct Capture {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl Capture {
    fn start<R>(mut reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk).await {
                    Ok(0) => break,
                    Err(e) => {
                        tracing::debug!(error = %e, "pipe read failed; capture ended");
                        break;
                    }
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                }
            }
        });
        Self { buf, task }
    }

    /// Waits up to [`DRAIN_GRACE`] for EOF, then returns whatever was read.
    async fn finish(self) -> String {
        let mut task = self.task;
        if time::timeout(DRAIN_GRACE, &mut task).await.is_err() {
            task.abort();
        }
        let bytes = std::mem::take(&mut *self.buf.lock().unwrap_or_else(PoisonError::into_inner));
        String::from_utf8_lossy(&bytes).into_owned()
    }
}
