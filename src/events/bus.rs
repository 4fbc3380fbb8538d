//! # Event bus for broadcasting supervisor events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking publishing from every component of one supervisor.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                    Consumers:
//!   Supervisor ──┐
//!   Breaker    ──┼──► Bus ──┬──► listener task ──► SubscriberSet ──► Subscribe::on_event
//!   Limiter    ──┤          └──► Supervisor::events() (raw receivers)
//!   Workers    ──┘
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks.
//! - **Per-bus sequence**: each published event is stamped with the next sequence
//!   number of *this* bus; two supervisors never share a counter.
//! - **Arrival order = sequence order**: stamping and sending happen under one
//!   short lock, so every receiver observes strictly increasing `seq`.
//! - **Bounded capacity**: slow receivers observe `RecvError::Lagged(n)`.
//! - **No persistence**: events published with no receivers are dropped.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for supervisor events.
///
/// Cheap to clone; all clones share the channel and the sequence counter.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
    seq: Arc<Mutex<u64>>,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self {
            tx,
            seq: Arc::new(Mutex::new(0)),
        }
    }

    /// Stamps `ev` with the next sequence number and publishes it.
    ///
    /// Returns the assigned sequence number. If there are no receivers the
    /// event is dropped.
    pub fn publish(&self, mut ev: Event) -> u64 {
        let mut next = self.seq.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = *next;
        *next += 1;
        ev.seq = seq;
        let _ = self.tx.send(ev);
        seq
    }

    /// Number of events published so far (the next sequence number).
    pub fn published(&self) -> u64 {
        *self.seq.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn sequence_is_per_bus_and_monotonic() {
        let a = Bus::new(8);
        let b = Bus::new(8);
        let mut rx = a.subscribe();

        assert_eq!(a.publish(Event::new(EventKind::QueueChange)), 0);
        assert_eq!(a.publish(Event::new(EventKind::QueueChange)), 1);
        assert_eq!(b.publish(Event::new(EventKind::QueueChange)), 0);
        assert_eq!(a.published(), 2);

        assert_eq!(rx.recv().await.unwrap().seq, 0);
        assert_eq!(rx.recv().await.unwrap().seq, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_publishers_arrive_in_sequence_order() {
        const TASKS: usize = 8;
        const PER_TASK: usize = 5_000;

        let bus = Bus::new(TASKS * PER_TASK);
        let mut rx = bus.subscribe();
        let publishers: Vec<_> = (0..TASKS)
            .map(|_| {
                let bus = bus.clone();
                tokio::spawn(async move {
                    for _ in 0..PER_TASK {
                        bus.publish(Event::new(EventKind::QueueChange));
                    }
                })
            })
            .collect();
        for p in publishers {
            p.await.unwrap();
        }

        let seqs: Vec<u64> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs.len(), TASKS * PER_TASK);
        let inversions = seqs.windows(2).filter(|w| w[0] >= w[1]).count();
        assert_eq!(inversions, 0);
        assert_eq!(bus.published(), (TASKS * PER_TASK) as u64);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = Bus::new(0);
        let _rx = bus.subscribe();
        bus.publish(Event::new(EventKind::CommandStart));
    }
}
