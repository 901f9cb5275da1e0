//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
///
/// `InsufficientStock` and `ClaimConflict` are expected outcomes of lost
/// races; callers re-check and retry. Everything else is a hard rejection.
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

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A status change outside the allowed successor set was requested.
    #[error("invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// Requested quantity exceeds what is available at check time.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: u32, available: u32 },

    /// A unit or quantity slice is already claimed by another transaction.
    #[error("claim conflict: {0}")]
    ClaimConflict(String),

    /// A return quantity exceeds the line's outstanding quantity.
    #[error("over-return on line {line_no}: requested {requested}, outstanding {outstanding}")]
    OverReturn {
        line_no: u32,
        requested: u32,
        outstanding: u32,
    },

    /// Finalization was attempted while required assessment data is missing.
    #[error("incomplete assessment: {0}")]
    IncompleteAssessment(String),
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

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn invalid_transition(
        entity: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::InvalidTransition {
            entity: entity.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn insufficient_stock(requested: u32, available: u32) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn claim_conflict(msg: impl Into<String>) -> Self {
        Self::ClaimConflict(msg.into())
    }

    pub fn over_return(line_no: u32, requested: u32, outstanding: u32) -> Self {
        Self::OverReturn {
            line_no,
            requested,
            outstanding,
        }
    }

    pub fn incomplete_assessment(msg: impl Into<String>) -> Self {
        Self::IncompleteAssessment(msg.into())
    }

    /// Whether the caller may safely retry after re-checking state.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock { .. } | Self::ClaimConflict(_) | Self::Conflict(_)
        )
    }
}
