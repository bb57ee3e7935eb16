//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every variant is a deterministic business outcome: the same state and the
/// same command always produce the same error. Infrastructure failures (log
/// unreachable, timeouts) belong to the infra crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (malformed input, value outside declared bounds).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested transition is not allowed from the current lifecycle state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// The same actor already performed this action on the same target.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A referenced entity is absent from the derived state.
    #[error("not found: {0}")]
    NotFound(String),

    /// An identifier was invalid (empty or blank).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A business-level conflict (e.g. a resource already held by someone else).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(msg: impl Into<String>) -> Self {
        Self::InvalidTransition(msg.into())
    }

    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::Duplicate(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Human-readable reason without the category prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::Validation(msg)
            | Self::InvalidTransition(msg)
            | Self::Duplicate(msg)
            | Self::NotFound(msg)
            | Self::InvalidId(msg)
            | Self::Conflict(msg) => msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strips_category() {
        let err = DomainError::duplicate("already rated");
        assert_eq!(err.reason(), "already rated");
        assert_eq!(err.to_string(), "duplicate: already rated");
    }
}
