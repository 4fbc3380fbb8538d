//! # Slot accounting and backlog draining.
//!
//! ## Architecture
//! ```text
//! acquire() ──► slot free and backlog empty? ──yes──► SlotPermit
//!                     │ no
//!                     ▼
//!               enqueue() ──► [backlog FIFO] ──► QueueTicket::wait()
//!                                   ▲                   │
//! SlotPermit::drop ──► release ─────┘ hand slot to front entry
//! clear()          ──► reject every entry with Cancelled
//! ```
//!
//! The slot counter and the backlog live under one mutex that is never held
//! across an `.await`, so every grant, release and cancellation is a single
//! indivisible step.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, oneshot};

use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::limiter::queue::{PendingCommand, QueueTicket, QueuedCommand};

struct Inner {
    active: usize,
    queue: VecDeque<QueuedCommand>,
    closed: bool,
}

/// Bounds the number of simultaneously running commands.
pub struct ConcurrencyLimiter {
    max: Option<usize>,
    bus: Bus,
    next_id: AtomicU64,
    inner: Mutex<Inner>,
    idle: Notify,
}

impl ConcurrencyLimiter {
    /// Creates a limiter with `max` slots (`None` = unlimited).
    pub fn new(max: Option<usize>, bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            max,
            bus,
            next_id: AtomicU64::new(1),
            inner: Mutex::new(Inner {
                active: 0,
                queue: VecDeque::new(),
                closed: false,
            }),
            idle: Notify::new(),
        })
    }

    /// Takes a slot without waiting, if one is free and nobody is queued.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotPermit> {
        let mut inner = self.lock();
        if inner.closed || !inner.queue.is_empty() || !self.has_capacity(&inner) {
            return None;
        }
        inner.active += 1;
        Some(SlotPermit::granted(Arc::clone(self)))
    }

    /// Takes a slot, waiting in the backlog when all slots are busy.
    ///
    /// Fails with [`SupervisorError::Cancelled`] if the backlog is cleared
    /// while waiting, or [`SupervisorError::Shutdown`] once the limiter is closed.
    pub async fn acquire(
        self: &Arc<Self>,
        command: &str,
        args: &[String],
    ) -> Result<SlotPermit, SupervisorError> {
        if self.lock().closed {
            return Err(SupervisorError::Shutdown);
        }
        if let Some(permit) = self.try_acquire() {
            return Ok(permit);
        }
        self.enqueue(command, args).wait().await
    }

    /// Appends a command to the backlog and returns its deferred handle.
    ///
    /// If a slot is free the entry is granted immediately and the ticket
    /// resolves on first poll.
    pub fn enqueue(self: &Arc<Self>, command: &str, args: &[String]) -> QueueTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (entry, rx) = QueuedCommand::new(id, command, args);

        let mut inner = self.lock();
        if inner.closed {
            entry.reject(SupervisorError::Shutdown);
        } else {
            inner.queue.push_back(entry);
            tracing::debug!(id, command, queued = inner.queue.len(), "command queued");
            self.publish_size(&inner);
            self.dispatch(&mut inner);
        }
        drop(inner);

        QueueTicket {
            id,
            limiter: Arc::clone(self),
            rx: Some(rx),
        }
    }

    /// Rejects every queued command with [`SupervisorError::Cancelled`].
    ///
    /// Running commands are not affected. Returns the number of rejected entries.
    pub fn clear(&self) -> usize {
        self.reject_all(SupervisorError::Cancelled)
    }

    /// Rejects the backlog with [`SupervisorError::Shutdown`] and refuses new entries.
    pub fn close(&self) -> usize {
        self.lock().closed = true;
        self.reject_all(SupervisorError::Shutdown)
    }

    /// Number of queued (not yet started) commands.
    pub fn size(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of slots currently held.
    pub fn active_count(&self) -> usize {
        self.lock().active
    }

    /// Configured limit (`None` = unlimited).
    pub fn max_concurrent(&self) -> Option<usize> {
        self.max
    }

    /// Resolves once no slot is held.
    pub async fn idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.active_count() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Queued commands in the order they will be started.
    pub fn snapshot(&self) -> Vec<PendingCommand> {
        self.lock()
            .queue
            .iter()
            .map(|q| q.pending.clone())
            .collect()
    }

    fn reject_all(&self, err: SupervisorError) -> usize {
        let mut inner = self.lock();
        let drained: Vec<QueuedCommand> = inner.queue.drain(..).collect();
        let n = drained.len();
        for entry in drained {
            entry.reject(err.clone());
        }
        if n > 0 {
            tracing::info!(rejected = n, reason = err.as_label(), "queue cleared");
            self.publish_size(&inner);
        }
        n
    }

    /// Frees one slot and hands it on to the backlog.
    pub(super) fn release(&self) {
        let mut inner = self.lock();
        self.release_locked(&mut inner);
    }

    /// Removes a dropped ticket from the backlog, or returns the slot it was granted.
    pub(super) fn withdraw(&self, id: u64, mut rx: oneshot::Receiver<Result<(), SupervisorError>>) {
        let mut inner = self.lock();
        if let Some(pos) = inner.queue.iter().position(|q| q.pending.id == id) {
            inner.queue.remove(pos);
            tracing::debug!(id, "queued command withdrawn");
            self.publish_size(&inner);
            return;
        }
        // Grants happen under this lock, so any grant for `id` is already in the channel.
        rx.close();
        if let Ok(Ok(())) = rx.try_recv() {
            self.release_locked(&mut inner);
        }
    }

    fn release_locked(&self, inner: &mut Inner) {
        inner.active = inner.active.saturating_sub(1);
        self.dispatch(inner);
        if inner.active == 0 {
            self.idle.notify_waiters();
        }
    }

    /// Grants free slots to the front of the backlog.
    fn dispatch(&self, inner: &mut Inner) {
        let mut changed = false;
        while self.has_capacity(inner) {
            let Some(entry) = inner.queue.pop_front() else {
                break;
            };
            changed = true;
            let id = entry.pending.id;
            if entry.grant() {
                inner.active += 1;
                tracing::debug!(id, active = inner.active, "slot granted to queued command");
            }
        }
        if changed {
            self.publish_size(inner);
        }
    }

    fn has_capacity(&self, inner: &Inner) -> bool {
        self.max.is_none_or(|max| inner.active < max)
    }

    fn publish_size(&self, inner: &Inner) {
        self.bus
            .publish(Event::new(EventKind::QueueChange).with_queue_size(inner.queue.len()));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One held concurrency slot. Dropping it releases the slot.
#[must_use = "dropping the permit releases the slot immediately"]
pub struct SlotPermit {
    limiter: Arc<ConcurrencyLimiter>,
}

impl SlotPermit {
    pub(super) fn granted(limiter: Arc<ConcurrencyLimiter>) -> Self {
        Self { limiter }
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.limiter.release();
    }
}
