use std::time::Duration;

/// Circuit breaker tuning.
///
/// ## Field semantics
/// - `threshold`: consecutive failures in `closed` that open the circuit (min 1)
/// - `reset_timeout`: time spent `open` before a trial is let through
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub threshold: u32,
    /// How long the circuit stays open before allowing a trial.
    pub reset_timeout: Duration,
}

impl BreakerConfig {
    /// Threshold clamped to a minimum of 1.
    #[inline]
    pub fn threshold_clamped(&self) -> u32 {
        self.threshold.max(1)
    }
}

impl Default for BreakerConfig {
    /// Default configuration:
    ///
    /// - `threshold = 5`
    /// - `reset_timeout = 60s`
    fn default() -> Self {
        Self {
            threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}
