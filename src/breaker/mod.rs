//! Circuit breaker: failure isolation for one wrapped dependency.
//!
//! ## Contents
//! - [`CircuitState`] `closed | open | half-open`
//! - [`BreakerConfig`] threshold and reset timeout
//! - [`CircuitBreaker`] the state machine, publishing `circuit:change`
//! - [`Admission`] proof that an attempt passed the gate
//!
//! ## State machine
//! ```text
//!            failures >= threshold             reset_timeout elapsed
//!  Closed ─────────────────────────► Open ─────────────────────────► HalfOpen
//!    ▲                                ▲                                 │
//!    │            trial succeeds      │          trial fails            │
//!    └────────────────────────────────┼─────────────────────────────────┤
//!                                     └─────────────────────────────────┘
//! ```

mod circuit;
mod config;
mod state;

pub use circuit::{Admission, CircuitBreaker};
pub use config::BreakerConfig;
pub use state::CircuitState;
