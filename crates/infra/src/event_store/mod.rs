//! Append-only event log boundary.
//!
//! The log is reached only through the [`EventStore`] trait: conditional
//! append, criteria reads, tail reads and the head position.

pub mod in_memory;
pub mod query;
pub mod r#trait;

use serde_json::Value as JsonValue;
use tracing::warn;

use tagstream_core::Position;
use tagstream_events::{Criteria, EventBus, EventEnvelope};

pub use in_memory::InMemoryEventStore;
pub use query::{EventFilter, EventQuery, EventQueryResult, Pagination};
pub use r#trait::{AppendCondition, EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Decorator that publishes committed events to an [`EventBus`] after a
/// successful append.
///
/// Publication never happens for a rejected append. A publish failure after a
/// durable append is logged and swallowed: the command already succeeded and
/// consumers recover by reading the log. [`PublishingEventStore::republish`]
/// pushes a range again when needed.
pub struct PublishingEventStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingEventStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> PublishingEventStore<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Publish every committed event after `position` again.
    ///
    /// Returns how many envelopes were published.
    pub fn republish(&self, position: Position, batch: usize) -> Result<usize, EventStoreError> {
        let mut cursor = position;
        let mut published = 0;
        loop {
            let page = self.store.read_after(cursor, batch.max(1))?;
            let Some(last) = page.last().map(|e| e.position) else {
                return Ok(published);
            };
            for e in page {
                self.bus
                    .publish(e.into_envelope())
                    .map_err(|err| EventStoreError::Publish(err.to_string()))?;
                published += 1;
            }
            cursor = last;
        }
    }
}

impl<S, B> EventStore for PublishingEventStore<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        condition: Option<AppendCondition>,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let committed = self.store.append(events, condition)?;

        for e in &committed {
            if let Err(err) = self.bus.publish(e.to_envelope()) {
                warn!(
                    position = %e.position,
                    event_type = %e.event_type,
                    error = %err,
                    "publish after append failed; consumers will catch up from the log"
                );
            }
        }

        Ok(committed)
    }

    fn read(&self, criteria: &Criteria) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.store.read(criteria)
    }

    fn read_after(&self, position: Position, limit: usize) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.store.read_after(position, limit)
    }

    fn head(&self) -> Result<Position, EventStoreError> {
        self.store.head()
    }
}
