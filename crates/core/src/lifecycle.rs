//! Generalized entity lifecycle: `Unset → Active(sub-state) → Terminal`.
//!
//! Every domain entity follows this shape. Transitions out of `Terminal` are
//! always rejected; moves between active sub-states are guarded by the domain.

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lifecycle<A, T> {
    /// No event has established the entity yet.
    #[default]
    Unset,
    /// Established; `A` is the domain-specific sub-state.
    Active(A),
    /// Final; `T` records how the entity ended.
    Terminal(T),
}

impl<A, T> Lifecycle<A, T> {
    pub fn is_unset(&self) -> bool {
        matches!(self, Lifecycle::Unset)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Lifecycle::Active(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Terminal(_))
    }

    pub fn terminal(&self) -> Option<&T> {
        match self {
            Lifecycle::Terminal(t) => Some(t),
            _ => None,
        }
    }

    /// Reject any command against an entity that already ended.
    pub fn ensure_not_terminal(&self, entity: &str) -> DomainResult<()>
    where
        T: core::fmt::Debug,
    {
        match self {
            Lifecycle::Terminal(t) => Err(terminal_error(t, entity)),
            _ => Ok(()),
        }
    }

    /// Require the entity to be established and not yet terminal.
    pub fn require_active(&self, entity: &str) -> DomainResult<&A>
    where
        T: core::fmt::Debug,
    {
        match self {
            Lifecycle::Unset => Err(DomainError::not_found(format!("{entity} does not exist"))),
            Lifecycle::Active(a) => Ok(a),
            Lifecycle::Terminal(t) => Err(terminal_error(t, entity)),
        }
    }

    /// Require that nothing established the entity yet (creation commands).
    pub fn require_unset(&self, entity: &str) -> DomainResult<()> {
        if self.is_unset() {
            Ok(())
        } else {
            Err(DomainError::duplicate(format!("{entity} already exists")))
        }
    }
}

fn terminal_error<T: core::fmt::Debug>(terminal: &T, entity: &str) -> DomainError {
    DomainError::invalid_transition(format!(
        "invalid transition from terminal state {terminal:?} of {entity}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Ended {
        Cancelled,
    }

    type State = Lifecycle<u8, Ended>;

    #[test]
    fn terminal_rejects_with_invalid_transition() {
        let s: State = Lifecycle::Terminal(Ended::Cancelled);
        let err = s.require_active("appointment").unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition(_)));
        assert!(err.reason().contains("terminal"));
    }

    #[test]
    fn unset_is_not_found_for_active_commands() {
        let s: State = Lifecycle::Unset;
        assert!(matches!(s.require_active("appointment"), Err(DomainError::NotFound(_))));
        assert!(s.require_unset("appointment").is_ok());
    }

    #[test]
    fn active_cannot_be_created_twice() {
        let s: State = Lifecycle::Active(1);
        assert_eq!(s.require_active("x").unwrap(), &1);
        assert!(matches!(s.require_unset("x"), Err(DomainError::Duplicate(_))));
    }
}
