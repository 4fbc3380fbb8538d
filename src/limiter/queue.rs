//! # Queued commands and their completion handles.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::oneshot;

use crate::error::SupervisorError;
use crate::limiter::{ConcurrencyLimiter, SlotPermit};

/// Read-only view of a queued command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCommand {
    /// Queue-unique id.
    pub id: u64,
    /// Program name.
    pub command: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Enqueue time, milliseconds since the Unix epoch.
    pub queued_at_ms: u64,
}

/// Entry owned by the backlog until it is granted a slot or cancelled.
pub(super) struct QueuedCommand {
    pub(super) pending: PendingCommand,
    pub(super) completion: oneshot::Sender<Result<(), SupervisorError>>,
}

impl QueuedCommand {
    pub(super) fn new(
        id: u64,
        command: &str,
        args: &[String],
    ) -> (Self, oneshot::Receiver<Result<(), SupervisorError>>) {
        let (tx, rx) = oneshot::channel();
        let queued_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        let entry = Self {
            pending: PendingCommand {
                id,
                command: command.to_string(),
                args: args.to_vec(),
                queued_at_ms,
            },
            completion: tx,
        };
        (entry, rx)
    }

    /// Grants the slot. Returns `false` if the ticket is gone.
    pub(super) fn grant(self) -> bool {
        self.completion.send(Ok(())).is_ok()
    }

    /// Rejects the entry with `err`.
    pub(super) fn reject(self, err: SupervisorError) {
        let _ = self.completion.send(Err(err));
    }
}

/// Deferred handle for a command waiting in the backlog.
///
/// Await [`wait`](Self::wait) to obtain the slot. Dropping the ticket before
/// it resolves withdraws the command from the queue; if a slot had already
/// been granted to it, the slot is released again.
#[must_use = "dropping a ticket withdraws the command from the queue"]
pub struct QueueTicket {
    pub(super) id: u64,
    pub(super) limiter: Arc<ConcurrencyLimiter>,
    pub(super) rx: Option<oneshot::Receiver<Result<(), SupervisorError>>>,
}

impl QueueTicket {
    /// Queue id of this entry.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Waits until the command is granted a slot or cancelled.
    pub async fn wait(mut self) -> Result<SlotPermit, SupervisorError> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(SupervisorError::Cancelled);
        };
        let res = rx.await;
        self.rx = None;
        match res {
            Ok(Ok(())) => Ok(SlotPermit::granted(Arc::clone(&self.limiter))),
            Ok(Err(e)) => Err(e),
            Err(_closed) => Err(SupervisorError::Cancelled),
        }
    }
}

impl Drop for QueueTicket {
    fn drop(&mut self) {
        if let Some(rx) = self.rx.take() {
            self.limiter.withdraw(self.id, rx);
        }
    }
}
