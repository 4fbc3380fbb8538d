//! # Closure-backed subscriber for one event kind.
//!
//! [`Listener`] adapts an `Fn(&Event)` closure into a [`Subscribe`] bound to a
//! single [`EventKind`]; it backs [`Supervisor::on`](crate::Supervisor::on).
//!
//! ## Example
//! ```rust
//! use cmdvisor::{EventKind, Listener, Subscribe};
//!
//! let l = Listener::new(EventKind::QueueChange, |ev| {
//!     println!("queue size = {:?}", ev.queue_size);
//! });
//! assert!(l.accepts(EventKind::QueueChange));
//! assert!(!l.accepts(EventKind::CommandStart));
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Subscriber that calls a closure for every event of one kind.
pub struct Listener<F> {
    kind: EventKind,
    f: F,
}

impl<F> Listener<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    /// Creates a listener for `kind`.
    pub fn new(kind: EventKind, f: F) -> Self {
        Self { kind, f }
    }
}

#[async_trait]
impl<F> Subscribe for Listener<F>
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    async fn on_event(&self, event: &Event) {
        (self.f)(event);
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind == self.kind
    }

    fn name(&self) -> &'static str {
        self.kind.as_str()
    }
}
