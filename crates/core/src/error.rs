//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// The taxonomy callers rely on:
///
/// - `NotFound`: a referenced item, movement, alert or rule does not exist
/// - `Validation`: malformed input (rule definitions, schedules, quantities)
/// - `Gate`: a pre-execution check (cooldown, execution limit) rejected a run.
///   This is not an execution failure.
/// - `Execution`: a single action or item failed while a batch was running
///
/// `InvariantViolation` and `Conflict` cover state invariants and optimistic
/// concurrency.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A pre-execution gate (cooldown / rate limit / lifecycle) rejected the run.
    #[error("execution gated: {0}")]
    Gate(String),

    /// An action failed while executing.
    #[error("execution failed: {0}")]
    Execution(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn gate(msg: impl Into<String>) -> Self {
        Self::Gate(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_gate(&self) -> bool {
        matches!(self, Self::Gate(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
