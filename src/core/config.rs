//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`], the settings consumed when a supervisor is
//! built, and [`ExecOptions`], the per-call overrides.
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (never queues)
//! - `timeout = 0s` → no timeout

use std::time::Duration;

use crate::breaker::BreakerConfig;
use crate::exec::ExecEnv;

/// Configuration for one supervisor instance.
///
/// ## Field semantics
/// - `timeout`: default per-command timeout (`0s` = none)
/// - `max_concurrent`: simultaneous processes (`0` = unlimited)
/// - `circuit_breaker`: failure threshold and reset timeout
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `dedup`: share one execution between identical in-flight requests
/// - `grace`: how long [`shutdown`](crate::Supervisor::shutdown) waits for killed processes
/// - `env`: environment handed to children by the default executor
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Default per-command timeout.
    pub timeout: Duration,

    /// Maximum number of processes running at once.
    pub max_concurrent: usize,

    /// Circuit breaker tuning.
    pub circuit_breaker: BreakerConfig,

    /// Capacity of the event bus broadcast channel.
    ///
    /// Raw receivers that fall further behind observe `Lagged` and skip events.
    pub bus_capacity: usize,

    /// Deduplicate identical in-flight requests (same command, arguments and timeout).
    pub dedup: bool,

    /// Maximum wait for running processes to exit during shutdown.
    pub grace: Duration,

    /// Environment for the default [`ProcessExecutor`](crate::ProcessExecutor).
    pub env: ExecEnv,
}

impl SupervisorConfig {
    /// Returns the concurrency limit as an `Option` (`None` = unlimited).
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns the default timeout as an `Option` (`None` = no timeout).
    #[inline]
    pub fn default_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns the bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `timeout = 30s`
    /// - `max_concurrent = 4`
    /// - `circuit_breaker = { threshold: 5, reset_timeout: 60s }`
    /// - `bus_capacity = 1024`
    /// - `dedup = true`
    /// - `grace = 5s`
    /// - `env = ExecEnv::default()` (`PATH`, `HOME`, `LANG` passed through)
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_concurrent: 4,
            circuit_breaker: BreakerConfig::default(),
            bus_capacity: 1024,
            dedup: true,
            grace: Duration::from_secs(5),
            env: ExecEnv::default(),
        }
    }
}

/// Per-call overrides for [`Supervisor::execute_with`](crate::Supervisor::execute_with).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Timeout for this call; `None` uses the configured default.
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    /// Options with an explicit timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}
