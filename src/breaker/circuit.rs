//! # Three-state circuit breaker.
//!
//! [`CircuitBreaker`] decides, per attempt, whether the wrapped command may run
//! and tracks consecutive failures to detect a persistently broken dependency.
//!
//! ## Rules
//! - All transitions happen inside one short critical section; each one is
//!   published as `circuit:change` before the lock is released, so the event
//!   order equals the transition order.
//! - Outcomes of attempts that are not the designated trial are ignored while
//!   the circuit is `open` or `half-open`.
//! - While `half-open` exactly one trial is in flight.
//! - Time is read from `tokio::time::Instant` (pausable in tests).

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;

use crate::breaker::{BreakerConfig, CircuitState};
use crate::events::{Bus, Event, EventKind};

/// Proof that an attempt passed [`CircuitBreaker::admit`].
///
/// Hand it back to [`CircuitBreaker::record`] with the outcome, or to
/// [`CircuitBreaker::abandon`] when the attempt never produced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an admission must be resolved with record() or abandon()"]
pub struct Admission {
    trial: bool,
}

impl Admission {
    /// `true` if this attempt is the half-open trial.
    #[inline]
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Circuit breaker owned by one supervisor.
#[derive(Debug)]
pub struct CircuitBreaker {
    cfg: BreakerConfig,
    bus: Bus,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker that publishes transitions on `bus`.
    pub fn new(cfg: BreakerConfig, bus: Bus) -> Self {
        Self {
            cfg,
            bus,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
        }
    }

    /// Breaker configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.cfg
    }

    /// Admits or rejects the next attempt.
    ///
    /// - `closed`: always admitted.
    /// - `open`: rejected until `reset_timeout` has elapsed; then the breaker
    ///   moves to `half-open` and this attempt becomes the trial.
    /// - `half-open`: admitted as the trial only if no trial is in flight.
    pub fn admit(&self) -> Option<Admission> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Some(Admission { trial: false }),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.cfg.reset_timeout);
                if !elapsed {
                    return None;
                }
                self.transition(&mut inner, CircuitState::HalfOpen);
                inner.trial_in_flight = true;
                Some(Admission { trial: true })
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    None
                } else {
                    inner.trial_in_flight = true;
                    Some(Admission { trial: true })
                }
            }
        }
    }

    /// Answers whether the next attempt may proceed.
    ///
    /// Same side effects as [`admit`](Self::admit): an `open` breaker past its
    /// reset timeout moves to `half-open` and the caller holds the trial. The
    /// caller must then report the outcome with [`record_success`](Self::record_success)
    /// or [`record_failure`](Self::record_failure).
    pub fn allow(&self) -> bool {
        self.admit().is_some()
    }

    /// Reports the outcome of an admitted attempt.
    ///
    /// A trial outcome only counts while the breaker is still `half-open`; a
    /// regular outcome only counts while it is still `closed`. Anything else
    /// is stale (the breaker moved on while the attempt ran) and is ignored.
    pub fn record(&self, admission: Admission, ok: bool) {
        let mut inner = self.lock();
        let counts = match inner.state {
            CircuitState::HalfOpen => admission.trial,
            CircuitState::Closed => !admission.trial,
            CircuitState::Open => false,
        };
        if !counts {
            tracing::debug!(state = %inner.state, trial = admission.trial, ok, "ignoring stale outcome");
            return;
        }
        self.apply(&mut inner, ok);
    }

    /// Releases an admission that will never report an outcome.
    ///
    /// Frees the half-open trial slot so another attempt can probe.
    pub fn abandon(&self, admission: Admission) {
        if admission.trial {
            let mut inner = self.lock();
            if inner.state == CircuitState::HalfOpen {
                inner.trial_in_flight = false;
            }
        }
    }

    /// Records a success observed outside of [`admit`](Self::admit)/[`record`](Self::record).
    ///
    /// Resets the counter in `closed`, closes the circuit in `half-open`,
    /// and is ignored in `open`.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            self.apply(&mut inner, true);
        }
    }

    /// Records a failure observed outside of [`admit`](Self::admit)/[`record`](Self::record).
    ///
    /// Counts towards the threshold in `closed`, reopens the circuit in
    /// `half-open`, and is ignored in `open`.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            self.apply(&mut inner, false);
        }
    }

    /// Forces the breaker to `closed` with a zero failure count.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.failures = 0;
        inner.trial_in_flight = false;
        inner.opened_at = None;
        self.transition(&mut inner, CircuitState::Closed);
    }

    /// Current state snapshot.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Consecutive failures counted in `closed`.
    pub fn failure_count(&self) -> u32 {
        self.lock().failures
    }

    fn apply(&self, inner: &mut Inner, ok: bool) {
        match (inner.state, ok) {
            (CircuitState::Closed, true) => inner.failures = 0,
            (CircuitState::Closed, false) => {
                inner.failures += 1;
                if inner.failures >= self.cfg.threshold_clamped() {
                    tracing::warn!(failures = inner.failures, "failure threshold reached; opening circuit");
                    self.open(inner);
                }
            }
            (CircuitState::HalfOpen, true) => {
                inner.trial_in_flight = false;
                inner.failures = 0;
                self.transition(inner, CircuitState::Closed);
            }
            (CircuitState::HalfOpen, false) => {
                inner.trial_in_flight = false;
                tracing::warn!("trial failed; reopening circuit");
                self.open(inner);
            }
            (CircuitState::Open, _) => {}
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.failures = 0;
        inner.opened_at = Some(Instant::now());
        self.transition(inner, CircuitState::Open);
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        tracing::info!(%from, %to, "circuit state changed");
        self.bus
            .publish(Event::new(EventKind::CircuitChange).with_transition(from, to));
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
