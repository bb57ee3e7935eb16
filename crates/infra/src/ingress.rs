//! Transport-neutral outcome mapping for command and query ingress.
//!
//! Whatever carries commands in (HTTP, CLI, a queue) turns dispatcher and
//! query results into an [`Outcome`]: a status code plus a JSON body.
//!
//! | Result | Status |
//! |---|---|
//! | accepted | 200 |
//! | rejected by a guard | 422 (404 when the entity does not exist) |
//! | concurrency conflict | 409 |
//! | infrastructure failure | 503 |

use serde::Serialize;
use serde_json::{Value as JsonValue, json};

use tagstream_core::DomainError;

use crate::command_dispatcher::{CommandReceipt, DispatchError, FailureKind};
use crate::query::QueryError;

pub const OK: u16 = 200;
pub const NOT_FOUND: u16 = 404;
pub const CONFLICT: u16 = 409;
pub const UNPROCESSABLE_ENTITY: u16 = 422;
pub const SERVICE_UNAVAILABLE: u16 = 503;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub status: u16,
    pub body: JsonValue,
}

impl Outcome {
    pub fn ok(body: JsonValue) -> Self {
        Self { status: OK, body }
    }

    pub fn is_success(&self) -> bool {
        self.status == OK
    }
}

pub fn json_error(status: u16, code: &'static str, message: impl Into<String>) -> Outcome {
    Outcome {
        status,
        body: json!({
            "error": code,
            "message": message.into(),
        }),
    }
}

/// Body of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub position: u64,
    pub events: Vec<AcceptedEvent>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcceptedEvent {
    pub event_id: String,
    pub event_type: String,
    pub position: u64,
}

impl From<&CommandReceipt> for Accepted {
    fn from(receipt: &CommandReceipt) -> Self {
        Self {
            position: receipt.position.value(),
            events: receipt
                .events
                .iter()
                .map(|e| AcceptedEvent {
                    event_id: e.event_id.to_string(),
                    event_type: e.event_type.clone(),
                    position: e.position.value(),
                })
                .collect(),
        }
    }
}

fn rejection_code(err: &DomainError) -> (u16, &'static str) {
    match err {
        DomainError::NotFound(_) => (NOT_FOUND, "not_found"),
        DomainError::Validation(_) => (UNPROCESSABLE_ENTITY, "validation_error"),
        DomainError::InvalidId(_) => (UNPROCESSABLE_ENTITY, "invalid_id"),
        DomainError::InvalidTransition(_) => (UNPROCESSABLE_ENTITY, "invalid_transition"),
        DomainError::Duplicate(_) => (UNPROCESSABLE_ENTITY, "duplicate"),
        DomainError::Conflict(_) => (UNPROCESSABLE_ENTITY, "conflict"),
    }
}

pub fn dispatch_error_to_outcome(err: &DispatchError) -> Outcome {
    match (err.kind(), err.rejection()) {
        (FailureKind::Rejection, Some(domain)) => {
            let (status, code) = rejection_code(domain);
            json_error(status, code, domain.reason())
        }
        (FailureKind::Conflict, _) => json_error(CONFLICT, "concurrency_conflict", err.to_string()),
        _ => json_error(SERVICE_UNAVAILABLE, "system_error", err.to_string()),
    }
}

pub fn command_outcome(result: &Result<CommandReceipt, DispatchError>) -> Outcome {
    match result {
        Ok(receipt) => Outcome::ok(json!(Accepted::from(receipt))),
        Err(err) => dispatch_error_to_outcome(err),
    }
}

pub fn query_outcome<T: Serialize>(result: &Result<T, QueryError>) -> Outcome {
    match result {
        Ok(view) => match serde_json::to_value(view) {
            Ok(body) => Outcome::ok(body),
            Err(e) => json_error(SERVICE_UNAVAILABLE, "serialization_error", e.to_string()),
        },
        Err(QueryError::NotFound(what)) => json_error(NOT_FOUND, "not_found", format!("{what} not found")),
        Err(QueryError::Store(e)) => json_error(SERVICE_UNAVAILABLE, "store_error", e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use tagstream_core::{EventId, Position, TagSet};

    use crate::event_store::{EventStoreError, StoredEvent};
    use crate::read_model::StoreError;

    use super::*;

    #[test]
    fn accepted_lists_committed_events() {
        let receipt = CommandReceipt {
            events: vec![StoredEvent {
                position: Position::new(4),
                event_id: EventId::new(),
                event_type: "rating.race.rated".to_string(),
                event_version: 1,
                occurred_at: chrono::Utc::now(),
                tags: TagSet::new(),
                payload: json!({}),
            }],
            position: Position::new(4),
        };
        let outcome = command_outcome(&Ok(receipt));
        assert_eq!(outcome.status, OK);
        assert_eq!(outcome.body["position"], 4);
        assert_eq!(outcome.body["events"][0]["event_type"], "rating.race.rated");
    }

    #[test]
    fn rejections_map_to_client_errors() {
        let dup = DispatchError::Rejected(DomainError::duplicate("user u-1 already rated race r-1"));
        let outcome = dispatch_error_to_outcome(&dup);
        assert_eq!(outcome.status, UNPROCESSABLE_ENTITY);
        assert_eq!(outcome.body["error"], "duplicate");
        assert_eq!(outcome.body["message"], "user u-1 already rated race r-1");

        let missing = DispatchError::Rejected(DomainError::not_found("appointment a-1 does not exist"));
        assert_eq!(dispatch_error_to_outcome(&missing).status, NOT_FOUND);
    }

    #[test]
    fn conflicts_and_outages() {
        let conflict = DispatchError::from(EventStoreError::Concurrency("raced".into()));
        assert_eq!(dispatch_error_to_outcome(&conflict).status, CONFLICT);

        let down = DispatchError::from(EventStoreError::Unavailable("no route".into()));
        assert_eq!(dispatch_error_to_outcome(&down).status, SERVICE_UNAVAILABLE);
    }

    #[test]
    fn queries_map_not_found() {
        let missing: Result<u32, QueryError> = Err(QueryError::NotFound("race r-1".into()));
        assert_eq!(query_outcome(&missing).status, NOT_FOUND);

        let down: Result<u32, QueryError> = Err(QueryError::Store(StoreError::Unavailable("x".into())));
        assert_eq!(query_outcome(&down).status, SERVICE_UNAVAILABLE);

        let ok: Result<u32, QueryError> = Ok(7);
        let outcome = query_outcome(&ok);
        assert!(outcome.is_success());
        assert_eq!(outcome.body, json!(7));
    }
}
