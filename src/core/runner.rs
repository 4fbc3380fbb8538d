//! # Run a single invocation through the supervisor's gates.
//!
//! Executes one [`Invocation`]: breaker gate, concurrency slot, process,
//! breaker outcome, terminal event.
//!
//! ## Event flow
//!
//! ```text
//! Rejected (shut down / circuit open / queue cleared):
//!   gate refuses → publish CommandError
//!
//! Ran:
//!   admit → acquire slot (may queue) → publish CommandStart
//!         → executor.run() → classify → breaker.record()
//!         → release slot → publish CommandComplete | CommandError
//! ```
//!
//! ## Rules
//! - Always publishes **exactly one** terminal event: `CommandComplete` or `CommandError`
//!   (unless the caller drops the future midway).
//! - A breaker admission is always resolved: recorded with the outcome, or
//!   abandoned when the attempt never produced one (queue cleared, shutdown, dropped).
//! - A run killed by shutdown is reported as `Shutdown` and never counted as a failure.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    breaker::{Admission, CircuitBreaker},
    error::SupervisorError,
    events::{Event, EventKind},
    exec::{CANCELLED_EXIT_CODE, CommandResult, ExecRequest},
};

use super::supervisor::Supervisor;

pub(super) type Outcome = Result<CommandResult, SupervisorError>;

/// One call to `execute`, after argument normalization.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(super) struct Invocation {
    pub(super) command: String,
    pub(super) args: Vec<String>,
    pub(super) timeout: Option<Duration>,
}

/// Resolves a breaker admission exactly once.
///
/// Dropping an unresolved guard abandons the admission.
struct AdmissionGuard<'a> {
    breaker: &'a CircuitBreaker,
    admission: Option<Admission>,
}

impl<'a> AdmissionGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, admission: Admission) -> Self {
        Self {
            breaker,
            admission: Some(admission),
        }
    }

    fn record(mut self, ok: bool) {
        if let Some(adm) = self.admission.take() {
            self.breaker.record(adm, ok);
        }
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        if let Some(adm) = self.admission.take() {
            self.breaker.abandon(adm);
        }
    }
}

/// Executes `inv` once on behalf of `sup`.
pub(super) async fn run_once(sup: &Supervisor, inv: Invocation) -> Outcome {
    let id = sup.next_invocation_id();
    let command: Arc<str> = Arc::from(inv.command.as_str());
    let args: Arc<[String]> = Arc::from(inv.args.as_slice());
    let event = |kind: EventKind| {
        Event::new(kind)
            .with_id(id)
            .with_command(Arc::clone(&command), Arc::clone(&args))
    };

    if sup.token.is_cancelled() {
        sup.bus
            .publish(event(EventKind::CommandError).with_error(SupervisorError::Shutdown));
        return Err(SupervisorError::Shutdown);
    }

    let Some(admission) = sup.breaker.admit() else {
        tracing::debug!(id, command = %command, "circuit open; rejecting command");
        sup.bus
            .publish(event(EventKind::CommandError).with_error(SupervisorError::CircuitOpen));
        return Err(SupervisorError::CircuitOpen);
    };
    let guard = AdmissionGuard::new(&sup.breaker, admission);

    let permit = match sup.limiter.acquire(&inv.command, &inv.args).await {
        Ok(permit) => permit,
        Err(err) => {
            sup.bus
                .publish(event(EventKind::CommandError).with_error(err.clone()));
            return Err(err);
        }
    };

    sup.bus.publish(event(EventKind::CommandStart));
    tracing::debug!(id, command = %command, trial = admission.is_trial(), "command started");

    let timeout = inv.timeout;
    let req = ExecRequest {
        command: inv.command,
        args: inv.args,
        timeout,
        cancel: sup.token.child_token(),
    };
    let outcome = match sup.executor.run(req).await {
        Ok(result) => classify(result, timeout, sup.token.is_cancelled()),
        Err(err) => Err(SupervisorError::Spawn(err)),
    };

    report(guard, &outcome);
    drop(permit);

    match &outcome {
        Ok(result) => {
            tracing::debug!(id, command = %command, duration_ms = result.duration_ms, "command completed");
            sup.bus
                .publish(event(EventKind::CommandComplete).with_result(result.clone()));
        }
        Err(err) => {
            if let SupervisorError::Timeout { timeout, .. } = err {
                tracing::warn!(id, command = %command, ?timeout, "command killed after timeout");
            }
            sup.bus
                .publish(event(EventKind::CommandError).with_error(err.clone()));
        }
    }
    outcome
}

/// Hands the outcome to the breaker.
///
/// Outcomes that are not breaker failures (a run killed by shutdown) abandon
/// the admission instead of counting.
fn report(guard: AdmissionGuard<'_>, outcome: &Outcome) {
    match outcome {
        Ok(_) => guard.record(true),
        Err(err) if err.is_breaker_failure() => guard.record(false),
        Err(_) => drop(guard),
    }
}

/// Maps a finished process onto the caller-facing outcome.
fn classify(result: CommandResult, timeout: Option<Duration>, shutting_down: bool) -> Outcome {
    if result.timed_out {
        return Err(SupervisorError::Timeout {
            timeout: timeout.unwrap_or_default(),
            result,
        });
    }
    if result.exit_code == CANCELLED_EXIT_CODE && shutting_down {
        return Err(SupervisorError::Shutdown);
    }
    if result.success() {
        Ok(result)
    } else {
        Err(SupervisorError::Execution { result })
    }
}
