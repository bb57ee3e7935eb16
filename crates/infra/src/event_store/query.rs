//! Read-only, paginated log inspection.
//!
//! Used by the replay tooling and for debugging. Results are always in
//! position order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tagstream_core::{EventId, Position, Tag};

use super::{EventStoreError, InMemoryEventStore, StoredEvent};

/// Pagination parameters for event queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    /// 0-based offset into the filtered result.
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Optional filters; every set field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Exact type name, e.g. "rating.race.rated".
    pub event_type: Option<String>,
    /// The event must carry this tag.
    pub tag: Option<Tag>,
    /// Only positions strictly greater than this.
    pub after: Option<Position>,
    /// Only positions up to and including this.
    pub up_to: Option<Position>,
    pub occurred_after: Option<DateTime<Utc>>,
    pub occurred_before: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &StoredEvent) -> bool {
        self.event_type.as_ref().is_none_or(|t| *t == event.event_type)
            && self.tag.as_ref().is_none_or(|t| event.tags.contains(t))
            && self.after.is_none_or(|p| event.position > p)
            && self.up_to.is_none_or(|p| event.position <= p)
            && self.occurred_after.is_none_or(|t| event.occurred_at > t)
            && self.occurred_before.is_none_or(|t| event.occurred_at < t)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQueryResult {
    pub events: Vec<StoredEvent>,
    /// Total number of events matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

#[async_trait::async_trait]
pub trait EventQuery: Send + Sync {
    async fn query_events(
        &self,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError>;

    /// Events carrying one tag, in position order.
    async fn get_tagged_events(
        &self,
        tag: Tag,
        pagination: Option<Pagination>,
    ) -> Result<EventQueryResult, EventStoreError> {
        let filter = EventFilter {
            tag: Some(tag),
            ..Default::default()
        };
        self.query_events(filter, pagination.unwrap_or_default()).await
    }

    async fn get_event_by_id(&self, event_id: EventId) -> Result<Option<StoredEvent>, EventStoreError>;
}

#[async_trait::async_trait]
impl EventQuery for InMemoryEventStore {
    async fn query_events(
        &self,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError> {
        let matching: Vec<StoredEvent> = self
            .all()?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();

        let total = matching.len() as u64;
        let events: Vec<StoredEvent> = matching
            .into_iter()
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect();
        let has_more = u64::from(pagination.offset) + (events.len() as u64) < total;

        Ok(EventQueryResult {
            events,
            total,
            pagination,
            has_more,
        })
    }

    async fn get_event_by_id(&self, event_id: EventId) -> Result<Option<StoredEvent>, EventStoreError> {
        Ok(self.all()?.into_iter().find(|e| e.event_id == event_id))
    }
}
