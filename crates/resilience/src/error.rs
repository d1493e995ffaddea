use std::time::Duration;

use thiserror::Error;

/// Terminal failure of a resilience-wrapped call.
///
/// `E` is the caller's own attempt error; it surfaces unchanged in
/// [`ResilienceError::Exhausted`] so callers can distinguish "the
/// dependency said no" from "the dependency was unreachable".
#[derive(Debug, Error)]
pub enum ResilienceError<E> {
    /// The circuit is open; the call was not attempted.
    #[error("circuit open for dependency {dependency}")]
    CircuitOpen { dependency: String },

    /// The final attempt exceeded the per-attempt timeout.
    #[error("dependency {dependency} timed out after {timeout:?}")]
    Timeout { dependency: String, timeout: Duration },

    /// All attempts failed; `cause` is the last attempt's error.
    #[error("dependency {dependency} failed after {attempts} attempts: {cause}")]
    Exhausted {
        dependency: String,
        attempts: u32,
        cause: E,
    },
}

impl<E> ResilienceError<E> {
    /// Returns the last attempt's error, if any attempt ran and failed.
    pub fn into_cause(self) -> Option<E> {
        match self {
            ResilienceError::Exhausted { cause, .. } => Some(cause),
            _ => None,
        }
    }
}
