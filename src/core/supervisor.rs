//! # Supervisor: gates external commands and fans out their lifecycle events.
//!
//! The [`Supervisor`] owns the event bus, the circuit breaker, the concurrency
//! limiter, a [`SubscriberSet`] and the executor. Every call to
//! [`execute`](Supervisor::execute) goes through the same pipeline.
//!
//! ## High-level architecture
//! ```text
//! execute(cmd, args) ──► dedup map ──(hit)──► await shared outcome
//!                            │ (miss)
//!                            ▼
//!                      runner::run_once
//!                            ├─► CircuitBreaker::admit()      (rejects fast when open)
//!                            ├─► ConcurrencyLimiter::acquire() (FIFO queue when full)
//!                            ├─► Executor::run()              (one process, no shell)
//!                            └─► breaker outcome, slot release, terminal event
//!
//! Event flow:
//!   Breaker / Limiter / runner ── publish(Event) ──► Bus ──► listener task ──► SubscriberSet::emit
//!                                                        └──► events() raw receivers
//!
//! Shutdown path:
//!   shutdown()
//!     └─► token.cancel()            → running processes are killed
//!     └─► limiter.close()           → queued commands fail with Shutdown
//!     └─► wait for idle (grace)     → GraceExceeded if slots are still held
//!     └─► flush listener, drain subscribers
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use cmdvisor::{Supervisor, SupervisorConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::new(SupervisorConfig::default());
//!     let out = sup.execute("echo", ["hello"]).await?;
//!     assert_eq!(out.stdout, "hello\n");
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::{
    breaker::{CircuitBreaker, CircuitState},
    core::{
        ExecOptions, SupervisorBuilder, SupervisorConfig, SupervisorStats,
        runner::{self, Invocation, Outcome},
    },
    error::{RuntimeError, SupervisorError},
    events::{Bus, Event, EventKind},
    exec::{CommandResult, ExecutorRef},
    limiter::{ConcurrencyLimiter, PendingCommand},
    subscribers::{Listener, Subscribe, SubscriberSet, SubscriptionId},
};

type SharedRun = Shared<BoxFuture<'static, Outcome>>;

/// Supervises external command invocations.
///
/// Created with [`Supervisor::new`] or [`Supervisor::builder`]; always handled
/// through an `Arc` so that deduplicated executions can outlive their first caller.
pub struct Supervisor {
    cfg: SupervisorConfig,
    pub(super) bus: Bus,
    pub(super) breaker: CircuitBreaker,
    pub(super) limiter: Arc<ConcurrencyLimiter>,
    pub(super) executor: ExecutorRef,
    pub(super) token: CancellationToken,
    subs: Arc<SubscriberSet>,
    forwarded: watch::Receiver<u64>,
    inflight: Mutex<HashMap<Invocation, SharedRun>>,
    next_id: AtomicU64,
}

impl Supervisor {
    /// Creates a supervisor with the default [`ProcessExecutor`](crate::ProcessExecutor)
    /// and no subscribers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(cfg: SupervisorConfig) -> Arc<Self> {
        SupervisorBuilder::new(cfg).build()
    }

    /// Returns a builder for subscribers and a custom executor.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: SupervisorConfig,
        subscribers: Vec<Arc<dyn Subscribe>>,
        executor: ExecutorRef,
    ) -> Arc<Self> {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(subscribers, bus.clone()));
        let forwarded = subscriber_listener(&bus, &subs);

        Arc::new(Self {
            breaker: CircuitBreaker::new(cfg.circuit_breaker.clone(), bus.clone()),
            limiter: ConcurrencyLimiter::new(cfg.concurrency_limit(), bus.clone()),
            executor,
            token: CancellationToken::new(),
            subs,
            forwarded,
            inflight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            bus,
            cfg,
        })
    }

    /// Runs `command` with `args` using the configured default timeout.
    ///
    /// Arguments are passed to the program as discrete tokens; no shell is involved.
    pub async fn execute<I, S>(
        self: &Arc<Self>,
        command: &str,
        args: I,
    ) -> Result<CommandResult, SupervisorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.execute_with(command, args, ExecOptions::default())
            .await
    }

    /// Runs `command` with `args` and per-call options.
    ///
    /// ### Flow
    /// 1. Resolve the timeout (`opts.timeout`, else the configured default; zero means none)
    /// 2. With dedup enabled, join an identical in-flight execution if one exists
    /// 3. Otherwise run the invocation through breaker, limiter and executor
    ///
    /// A deduplicated execution runs on its own task: dropping one caller's
    /// future does not cancel it for the others.
    pub async fn execute_with<I, S>(
        self: &Arc<Self>,
        command: &str,
        args: I,
        opts: ExecOptions,
    ) -> Result<CommandResult, SupervisorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let timeout = match opts.timeout {
            Some(t) if t.is_zero() => None,
            Some(t) => Some(t),
            None => self.cfg.default_timeout(),
        };
        let inv = Invocation {
            command: command.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            timeout,
        };

        if !self.cfg.dedup {
            return runner::run_once(self, inv).await;
        }
        self.shared_run(inv).await
    }

    /// Returns the in-flight execution for `inv`, starting one if needed.
    fn shared_run(self: &Arc<Self>, inv: Invocation) -> SharedRun {
        let mut inflight = self.lock_inflight();
        if let Some(existing) = inflight.get(&inv) {
            tracing::debug!(command = %inv.command, "joining in-flight execution");
            return existing.clone();
        }

        let guard = InflightGuard {
            sup: Arc::clone(self),
            key: inv.clone(),
        };
        let key = inv.clone();
        let handle = tokio::spawn(async move {
            let out = runner::run_once(&guard.sup, inv).await;
            drop(guard);
            out
        });
        let fut = async move {
            match handle.await {
                Ok(out) => out,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => Err(SupervisorError::Shutdown),
            }
        }
        .boxed()
        .shared();

        inflight.insert(key, fut.clone());
        fut
    }

    /// Current circuit state.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> SupervisorStats {
        SupervisorStats {
            active_count: self.limiter.active_count(),
            queued_count: self.limiter.size(),
            circuit_state: self.breaker.state(),
            failure_count: self.breaker.failure_count(),
        }
    }

    /// Queued commands in the order they will start.
    pub fn queued(&self) -> Vec<PendingCommand> {
        self.limiter.snapshot()
    }

    /// Forces the circuit to `closed` with a zero failure count.
    pub fn reset_circuit(&self) {
        tracing::info!(from = %self.breaker.state(), "circuit reset requested");
        self.breaker.reset();
    }

    /// Fails every queued command with [`SupervisorError::Cancelled`].
    ///
    /// Running commands are not affected. Returns the number of cancelled commands.
    pub fn clear_queue(&self) -> usize {
        self.limiter.clear()
    }

    /// Registers a closure for one event kind.
    ///
    /// Returns a handle for [`off`](Self::off). The closure runs on its own
    /// worker task; a panic inside it is reported as `subscriber:panicked`
    /// and never reaches the supervisor or other listeners.
    pub fn on<F>(&self, kind: EventKind, f: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.subs.add(Arc::new(Listener::new(kind, f)))
    }

    /// Unregisters a listener or subscriber. Returns `false` if `id` is unknown.
    pub fn off(&self, id: SubscriptionId) -> bool {
        self.subs.remove(id)
    }

    /// Registers a [`Subscribe`] implementation.
    pub fn subscribe(&self, sub: Arc<dyn Subscribe>) -> SubscriptionId {
        self.subs.add(sub)
    }

    /// Raw receiver over every event published from now on.
    ///
    /// Receivers that fall more than `bus_capacity` events behind observe
    /// `RecvError::Lagged`.
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Configuration this supervisor was built with.
    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// `true` once [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Stops the supervisor.
    ///
    /// Kills running processes, fails queued commands with
    /// [`SupervisorError::Shutdown`], waits up to `grace` for the slots to be
    /// released and finally drains the subscriber workers. Later calls to
    /// `execute` fail with [`SupervisorError::Shutdown`].
    ///
    /// Returns [`RuntimeError::GraceExceeded`] if processes were still running
    /// when the grace period ran out.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        if self.token.is_cancelled() {
            return Ok(());
        }
        tracing::info!(
            active = self.limiter.active_count(),
            queued = self.limiter.size(),
            "supervisor shutting down"
        );
        self.token.cancel();
        self.limiter.close();

        let grace = self.cfg.grace;
        let res = match tokio::time::timeout(grace, self.limiter.idle()).await {
            Ok(()) => Ok(()),
            Err(_elapsed) => {
                let active = self.limiter.active_count();
                tracing::warn!(?grace, active, "shutdown grace exceeded");
                Err(RuntimeError::GraceExceeded { grace, active })
            }
        };

        self.flush_listener().await;
        self.subs.shutdown().await;
        res
    }

    /// Waits until the listener task has forwarded every event published so far.
    async fn flush_listener(&self) {
        let target = self.bus.published();
        let mut forwarded = self.forwarded.clone();
        let _ = tokio::time::timeout(self.cfg.grace, forwarded.wait_for(|n| *n >= target)).await;
    }

    pub(super) fn next_invocation_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn lock_inflight(&self) -> MutexGuard<'_, HashMap<Invocation, SharedRun>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a deduplicated execution from the in-flight map when it ends.
struct InflightGuard {
    sup: Arc<Supervisor>,
    key: Invocation,
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.sup.lock_inflight().remove(&self.key);
    }
}

/// Subscribes to the bus and forwards events to the subscriber set.
///
/// Holds the set weakly so the task ends once the supervisor is dropped.
/// Reports the count of forwarded events (last `seq + 1`) through the returned watch.
fn subscriber_listener(bus: &Bus, subs: &Arc<SubscriberSet>) -> watch::Receiver<u64> {
    let mut rx = bus.subscribe();
    let set: Weak<SubscriberSet> = Arc::downgrade(subs);
    let (tx, forwarded) = watch::channel(0u64);

    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => {
                    let Some(set) = set.upgrade() else { break };
                    let next = ev.seq + 1;
                    set.emit_arc(Arc::new(ev));
                    advance_watermark(&tx, next);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged; events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    forwarded
}

/// Raises the forwarded-event watermark; a lower value never replaces a higher one.
pub(super) fn advance_watermark(tx: &watch::Sender<u64>, next: u64) -> bool {
    tx.send_if_modified(|cur| {
        let up = next > *cur;
        if up {
            *cur = next;
        }
        up
    })
}
