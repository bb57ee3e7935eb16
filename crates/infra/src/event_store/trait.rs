use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use tagstream_core::{EventId, Position, TagSet};
use tagstream_events::{Criteria, Event, EventEnvelope};

/// An event ready to be appended (no position yet).
///
/// Built from a typed domain event with [`UncommittedEvent::from_typed`], which
/// serializes the payload and stamps the event's correlation tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UncommittedEvent {
    pub event_id: EventId,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub tags: TagSet,
    pub payload: JsonValue,
}

impl UncommittedEvent {
    pub fn from_typed<E>(event: &E) -> Result<Self, EventStoreError>
    where
        E: Event + Serialize,
    {
        let payload = serde_json::to_value(event).map_err(|e| {
            EventStoreError::InvalidAppend(format!("payload serialization failed: {e}"))
        })?;
        let tags = event
            .tags()
            .map_err(|e| EventStoreError::InvalidAppend(format!("event tags: {e}")))?;

        Ok(Self {
            event_id: EventId::new(),
            event_type: event.event_type().to_string(),
            event_version: event.version(),
            occurred_at: event.occurred_at(),
            tags,
            payload,
        })
    }
}

/// A committed event with its global log position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Global position: starts at 1, gap-free, strictly increasing.
    pub position: Position,
    pub event_id: EventId,
    pub event_type: String,
    pub event_version: u32,
    pub occurred_at: DateTime<Utc>,
    pub tags: TagSet,
    pub payload: JsonValue,
}

impl StoredEvent {
    pub fn matches(&self, criteria: &Criteria) -> bool {
        criteria.matches(&self.event_type, &self.tags)
    }

    pub fn to_envelope(&self) -> EventEnvelope<JsonValue> {
        self.clone().into_envelope()
    }

    pub fn into_envelope(self) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            self.event_id,
            self.position,
            self.event_type,
            self.event_version,
            self.occurred_at,
            self.tags,
            self.payload,
        )
    }
}

/// Optimistic concurrency guard for an append.
///
/// The append fails with [`EventStoreError::Concurrency`] if any event matching
/// `fail_if_events_match` was committed after `after` (or at all, when `after`
/// is `None`). A command handler passes the criteria it read its state with and
/// the last position it observed, so a concurrent writer on the same entity
/// always makes one of the two appends fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendCondition {
    pub fail_if_events_match: Criteria,
    pub after: Option<Position>,
}

impl AppendCondition {
    pub fn new(fail_if_events_match: Criteria, after: Option<Position>) -> Self {
        Self {
            fail_if_events_match,
            after,
        }
    }

    /// Condition built from a read: `None` position when the history was empty.
    pub fn after_read(criteria: Criteria, last_seen: Position) -> Self {
        let after = (last_seen > Position::ZERO).then_some(last_seen);
        Self::new(criteria, after)
    }

    pub fn lower_bound(&self) -> Position {
        self.after.unwrap_or(Position::ZERO)
    }

    pub fn is_violated_by(&self, event: &StoredEvent) -> bool {
        event.position > self.lower_bound() && event.matches(&self.fail_if_events_match)
    }
}

/// Event log failure.
///
/// These are infrastructure outcomes; business rejections are `DomainError`s.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The append condition failed: another writer moved the entity forward.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("invalid append: {0}")]
    InvalidAppend(String),

    #[error("event log unavailable: {0}")]
    Unavailable(String),

    #[error("event log timed out: {0}")]
    Timeout(String),

    /// Publication of already committed events failed.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl EventStoreError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, EventStoreError::InvalidAppend(_))
    }
}

/// The append-only, tag-correlated event log.
///
/// Implementations must:
/// - assign global positions starting at 1 without gaps
/// - store a batch atomically (all events or none)
/// - evaluate the append condition and the append under one critical section
/// - return reads in position order
pub trait EventStore: Send + Sync {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        condition: Option<AppendCondition>,
    ) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Every event matching `criteria`, in position order.
    fn read(&self, criteria: &Criteria) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Up to `limit` events strictly after `position`, in position order.
    fn read_after(&self, position: Position, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Position of the last committed event (`Position::ZERO` when empty).
    fn head(&self) -> Result<Position, EventStoreError>;
}

impl<S> EventStore for Arc<S>
where
    S: EventStore + ?Sized,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        condition: Option<AppendCondition>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).append(events, condition)
    }

    fn read(&self, criteria: &Criteria) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).read(criteria)
    }

    fn read_after(&self, position: Position, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError> {
        (**self).read_after(position, limit)
    }

    fn head(&self) -> Result<Position, EventStoreError> {
        (**self).head()
    }
}
