//! # Non-blocking event fan-out to a dynamic set of subscribers.
//!
//! Provides [`SubscriberSet`] — distributes events to subscribers without
//! blocking the publisher. Subscribers can be added and removed at any time.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │  (skip subscribers whose accepts(kind) is false)
//!     ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!     │    (bounded)         └──────► panic → subscriber:panicked
//!     ├──► [queue 2] ──► worker 2 ──► subscriber2.on_event()
//!     └──► [queue N] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - **Per-subscriber FIFO**: each subscriber sees events in emission order.
//! - **No cross-subscriber ordering**.
//! - **Overflow**: event dropped for that subscriber only, `subscriber:overflow` published.
//! - **Isolation**: a slow or panicking subscriber doesn't affect others.
//! - **Removal**: a removed subscriber's worker finishes the events already queued, then exits.
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave a subscriber's own
//! shared state inconsistent if it panics while holding a lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Handle returned when a subscriber is registered; pass it to
/// [`SubscriberSet::remove`] (or [`Supervisor::off`](crate::Supervisor::off)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    id: u64,
    name: &'static str,
    sub: Arc<dyn Subscribe>,
    sender: mpsc::Sender<Arc<Event>>,
    worker: JoinHandle<()>,
}

/// Fan-out coordinator for event subscribers.
pub struct SubscriberSet {
    channels: RwLock<Vec<SubscriberChannel>>,
    next_id: AtomicU64,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a set and spawns one worker per initial subscriber.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let set = Self {
            channels: RwLock::new(Vec::with_capacity(subs.len())),
            next_id: AtomicU64::new(1),
            bus,
        };
        for sub in subs {
            set.add(sub);
        }
        set
    }

    /// Registers a subscriber and spawns its worker.
    pub fn add(&self, sub: Arc<dyn Subscribe>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cap = sub.queue_capacity().max(1);
        let name = sub.name();
        let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
        let s = Arc::clone(&sub);
        let bus = self.bus.clone();

        let worker = tokio::spawn(async move {
            while let Some(ev) = rx.recv().await {
                let fut = s.on_event(ev.as_ref());

                if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                    let info = {
                        let any = &*panic_err;
                        if let Some(msg) = any.downcast_ref::<&'static str>() {
                            (*msg).to_string()
                        } else if let Some(msg) = any.downcast_ref::<String>() {
                            msg.clone()
                        } else {
                            "unknown panic".to_string()
                        }
                    };
                    tracing::warn!(subscriber = s.name(), %info, "subscriber panicked");
                    bus.publish(Event::subscriber_panicked(s.name(), info));
                }
            }
        });

        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SubscriberChannel {
                id,
                name,
                sub,
                sender: tx,
                worker,
            });
        SubscriptionId(id)
    }

    /// Unregisters a subscriber. Returns `false` if the id is unknown.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        match channels.iter().position(|c| c.id == id.0) {
            Some(pos) => {
                channels.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of registered subscribers.
    pub fn len(&self) -> usize {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// `true` when no subscriber is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Emits an event to all interested subscribers (clones the event).
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a pre-allocated `Arc<Event>` to all interested subscribers.
    ///
    /// - Uses `try_send` (non-blocking)
    /// - On queue full or closed: drops the event for that subscriber and
    ///   publishes `subscriber:overflow`, unless the event is itself an overflow
    ///   report (prevents feedback loops).
    pub fn emit_arc(&self, event: Arc<Event>) {
        let is_overflow_evt = matches!(event.kind, EventKind::SubscriberOverflow);
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);

        for channel in channels.iter() {
            if !channel.sub.accepts(event.kind) {
                continue;
            }
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow_evt {
                tracing::warn!(subscriber = channel.name, reason, "event dropped for subscriber");
                self.bus
                    .publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }

    /// Unregisters every subscriber and waits for their workers to drain.
    pub async fn shutdown(&self) {
        let drained: Vec<SubscriberChannel> = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let mut workers = Vec::with_capacity(drained.len());
        for channel in drained {
            drop(channel.sender);
            workers.push(channel.worker);
        }
        for h in workers {
            let _ = h.await;
        }
    }
}
