//! Domain error taxonomy.

use thiserror::Error;

/// Errors surfaced by the business core.
///
/// The variants map one-to-one onto caller-visible outcomes: a missing
/// entity, a busy resource, a rejected business rule, or an unreachable
/// dependency. Cache and bus infrastructure errors never appear here -
/// they are recovered locally (log and degrade) at the call site.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Entity or dependency-owned resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The operation is already in progress elsewhere (lock not acquired
    /// within the wait window). Retry later; never a crash.
    #[error("operation in progress: {0}")]
    Conflict(String),

    /// A business rule rejected the operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// An outbound dependency timed out, was circuit-broken, or stayed
    /// unreachable through the retry budget. Distinct from [`Self::NotFound`]
    /// so callers don't confuse "doesn't exist" with "temporarily
    /// unreachable".
    #[error("dependency failure: {0}")]
    DependencyFailure(String),

    /// Malformed input (bad enum string, non-positive quantity, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// A versioned save lost the race against a concurrent writer.
    #[error("concurrent modification of {entity} {id}")]
    ConcurrencyConflict { entity: &'static str, id: String },
}

impl DomainError {
    /// Convenience constructor for a missing entity.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        DomainError::NotFound(what.to_string())
    }
}
