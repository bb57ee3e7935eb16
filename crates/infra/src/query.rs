//! Query side: answers come from read-model stores only, never from the log.

use thiserror::Error;

use crate::read_model::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Turn a point lookup into `NotFound` when the view has no record.
pub(crate) fn found<T>(value: Option<T>, what: impl FnOnce() -> String) -> QueryResult<T> {
    value.ok_or_else(|| QueryError::NotFound(what()))
}
