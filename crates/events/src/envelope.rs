use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tagstream_core::{EventId, Position, TagSet};

/// Envelope for an event, containing log metadata.
///
/// Notes:
/// - `position` is the global, strictly increasing log position.
/// - `tags` are the correlation tags the event was appended with.
/// - `payload` is either the typed domain event or its JSON form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: EventId,
    position: Position,
    event_type: String,
    event_version: u32,
    occurred_at: DateTime<Utc>,
    tags: TagSet,
    payload: E,
}

impl<E> EventEnvelope<E> {
    pub fn new(
        event_id: EventId,
        position: Position,
        event_type: impl Into<String>,
        event_version: u32,
        occurred_at: DateTime<Utc>,
        tags: TagSet,
        payload: E,
    ) -> Self {
        Self {
            event_id,
            position,
            event_type: event_type.into(),
            event_version,
            occurred_at,
            tags,
            payload,
        }
    }

    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> u32 {
        self.event_version
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }

    /// Replace the payload, keeping all log metadata.
    pub fn map_payload<F, T>(self, f: F) -> EventEnvelope<T>
    where
        F: FnOnce(E) -> T,
    {
        EventEnvelope {
            event_id: self.event_id,
            position: self.position,
            event_type: self.event_type,
            event_version: self.event_version,
            occurred_at: self.occurred_at,
            tags: self.tags,
            payload: f(self.payload),
        }
    }
}
