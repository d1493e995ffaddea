//! Composable resilience pipeline for outbound calls.
//!
//! Three layered policies, innermost first:
//! 1. **Timeout** - bounds a single attempt.
//! 2. **Retry** - repeats the timeout-wrapped attempt with exponential
//!    backoff, up to a fixed bound.
//! 3. **Circuit breaker** - counts consecutive failed executions per
//!    named dependency; past a threshold it short-circuits calls for a
//!    cool-down window, then lets one probe through before closing.
//!
//! One [`ResiliencePipeline`] is built per logical remote dependency so a
//! failing dependency never opens the circuit for an unrelated one.
//! Every transition (retry scheduled, circuit opened/half-open/closed) is
//! logged and counted; none of it is control flow for the caller.

pub mod breaker;
pub mod error;
pub mod pipeline;

pub use breaker::{CircuitBreaker, CircuitSnapshot};
pub use error::ResilienceError;
pub use pipeline::{ResilienceConfig, ResiliencePipeline};
