use crate::breaker::CircuitState;

/// Point-in-time view of a supervisor, returned by
/// [`Supervisor::stats`](crate::Supervisor::stats).
///
/// Each field is read separately, so under concurrent load the values may
/// belong to slightly different instants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SupervisorStats {
    /// Processes currently running.
    pub active_count: usize,
    /// Commands waiting for a slot.
    pub queued_count: usize,
    /// Circuit breaker state.
    pub circuit_state: CircuitState,
    /// Consecutive failures counted while `closed`.
    pub failure_count: u32,
}
