//! Booking overview: where a booking's container is and what the guest can do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use tagstream_access::{AccessEvent, AccessKey};
use tagstream_core::Position;
use tagstream_events::{Event, EventEnvelope, Projection, ProjectionError, decode};

use crate::projections::lookup::{Directory, Lookup};
use crate::query::{QueryResult, found};
use crate::read_model::ReadModelStore;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    ContainerObtained,
    CheckedIn,
    CheckedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingOverview {
    pub booking_id: String,
    pub guest_id: String,
    pub container_id: String,
    /// From the location directory; see the projection's fallback policy.
    pub container_location: Option<String>,
    pub status: BookingStatus,
    pub can_open_door: bool,
    pub obtained_at: DateTime<Utc>,
    pub last_door_request_at: Option<DateTime<Utc>>,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_out_at: Option<DateTime<Utc>>,
    /// Log position of the last event folded into this row.
    pub last_position: Position,
}

pub struct BookingOverviewProjection<S, D> {
    store: S,
    locations: Lookup<D>,
}

impl<S, D> BookingOverviewProjection<S, D>
where
    S: ReadModelStore<String, BookingOverview>,
    D: Directory,
{
    pub const NAME: &'static str = "booking_overview";

    pub fn new(store: S, locations: Lookup<D>) -> Self {
        Self { store, locations }
    }

    /// Update an existing overview. Events for a booking that was never
    /// obtained, for another container than the booking's, or at or below the
    /// row's position are acknowledged and dropped.
    fn update<F>(
        &self,
        key: &AccessKey,
        position: Position,
        event_type: &str,
        change: F,
    ) -> Result<(), ProjectionError>
    where
        F: FnOnce(&mut BookingOverview),
    {
        let Some(mut view) = self.store.get(&key.booking_id)? else {
            warn!(
                projection = Self::NAME,
                booking_id = %key.booking_id,
                event_type,
                "no overview for booking, event dropped"
            );
            return Ok(());
        };
        if view.last_position >= position {
            return Ok(());
        }
        if view.container_id != key.container_id {
            warn!(
                projection = Self::NAME,
                booking_id = %key.booking_id,
                container_id = %key.container_id,
                held = %view.container_id,
                event_type,
                "event for a container the booking does not hold, dropped"
            );
            return Ok(());
        }
        change(&mut view);
        view.last_position = position;
        self.store.upsert(key.booking_id.clone(), view)?;
        Ok(())
    }
}

impl<S, D> Projection for BookingOverviewProjection<S, D>
where
    S: ReadModelStore<String, BookingOverview>,
    D: Directory,
{
    fn name(&self) -> &str {
        Self::NAME
    }

    fn event_types(&self) -> &[&'static str] {
        AccessEvent::event_types()
    }

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let position = envelope.position();
        let event = decode::<AccessEvent>(envelope.clone())?.into_payload();
        let event_type = event.event_type();

        match event {
            AccessEvent::ContainerObtained(e) => {
                let existing = self.store.get(&e.key.booking_id)?;
                if existing.as_ref().is_some_and(|v| v.last_position >= position) {
                    return Ok(());
                }
                let location = self.locations.resolve(
                    &e.key.container_id,
                    existing.as_ref().and_then(|v| v.container_location.as_deref()),
                );
                let view = BookingOverview {
                    booking_id: e.key.booking_id.clone(),
                    guest_id: e.key.guest_id.clone(),
                    container_id: e.key.container_id.clone(),
                    container_location: location,
                    status: BookingStatus::ContainerObtained,
                    can_open_door: true,
                    obtained_at: e.occurred_at,
                    last_door_request_at: None,
                    checked_in_at: None,
                    checked_out_at: None,
                    last_position: position,
                };
                self.store.upsert(e.key.booking_id, view)?;
                Ok(())
            }
            AccessEvent::DoorOpeningRequested(e) => self.update(&e.key, position, event_type, |v| {
                v.last_door_request_at = Some(e.occurred_at);
            }),
            AccessEvent::GuestCheckedIn(e) => self.update(&e.key, position, event_type, |v| {
                v.status = BookingStatus::CheckedIn;
                v.checked_in_at = Some(e.occurred_at);
            }),
            AccessEvent::GuestCheckedOut(e) => self.update(&e.key, position, event_type, |v| {
                v.status = BookingStatus::CheckedOut;
                v.can_open_door = false;
                v.checked_out_at = Some(e.occurred_at);
            }),
        }
    }

    fn reset(&self) -> Result<(), ProjectionError> {
        self.store.clear()?;
        Ok(())
    }
}

pub struct BookingOverviewQuery<S> {
    store: S,
}

impl<S> BookingOverviewQuery<S>
where
    S: ReadModelStore<String, BookingOverview>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn booking(&self, booking_id: &str) -> QueryResult<BookingOverview> {
        found(self.store.get(&booking_id.to_string())?, || format!("booking {booking_id}"))
    }

    pub fn for_guest(&self, guest_id: &str) -> QueryResult<Vec<BookingOverview>> {
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|v| v.guest_id == guest_id)
            .collect())
    }

    /// The booking currently holding `container_id`.
    pub fn occupant_of(&self, container_id: &str) -> QueryResult<BookingOverview> {
        let current = self
            .store
            .list()?
            .into_iter()
            .filter(|v| v.container_id == container_id && v.status != BookingStatus::CheckedOut)
            .max_by_key(|v| v.obtained_at);
        found(current, || format!("occupant of container {container_id}"))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use tagstream_access::{ContainerObtained, GuestCheckedIn, GuestCheckedOut};
    use tagstream_core::{EventId, Position};

    use crate::projections::lookup::{InMemoryDirectory, LookupFallback};
    use crate::query::QueryError;
    use crate::read_model::InMemoryReadModelStore;

    use super::*;

    type Store = Arc<InMemoryReadModelStore<String, BookingOverview>>;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, hour, 0, 0).unwrap()
    }

    fn envelope(position: u64, event: AccessEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            EventId::new(),
            Position::new(position),
            event.event_type(),
            1,
            event.occurred_at(),
            event.tags().unwrap(),
            serde_json::to_value(&event).unwrap(),
        )
    }

    fn key() -> AccessKey {
        AccessKey::new("b-1", "g-1", "c-1")
    }

    fn setup(fallback: LookupFallback) -> (BookingOverviewProjection<Store, InMemoryDirectory>, BookingOverviewQuery<Store>) {
        let store: Store = Arc::new(InMemoryReadModelStore::new());
        let dir = InMemoryDirectory::new().with("c-2", "Hall B, bay 4");
        (
            BookingOverviewProjection::new(store.clone(), Lookup::new("container_location", dir, fallback)),
            BookingOverviewQuery::new(store),
        )
    }

    #[test]
    fn stay_is_tracked_through_checkout() {
        let (projection, query) = setup(LookupFallback::Placeholder("unknown".into()));
        let k = key();
        projection
            .apply(&envelope(1, AccessEvent::ContainerObtained(ContainerObtained { key: k.clone(), occurred_at: at(9) })))
            .unwrap();
        assert_eq!(query.occupant_of("c-1").unwrap().booking_id, "b-1");

        projection
            .apply(&envelope(2, AccessEvent::GuestCheckedIn(GuestCheckedIn { key: k.clone(), occurred_at: at(10) })))
            .unwrap();
        projection
            .apply(&envelope(3, AccessEvent::GuestCheckedOut(GuestCheckedOut { key: k, occurred_at: at(18) })))
            .unwrap();

        let view = query.booking("b-1").unwrap();
        assert_eq!(view.status, BookingStatus::CheckedOut);
        assert!(!view.can_open_door);
        assert_eq!(view.checked_in_at, Some(at(10)));
        assert!(matches!(query.occupant_of("c-1"), Err(QueryError::NotFound(_))));
    }

    #[test]
    fn missing_location_uses_the_placeholder() {
        let (projection, query) = setup(LookupFallback::Placeholder("unknown".into()));
        projection
            .apply(&envelope(1, AccessEvent::ContainerObtained(ContainerObtained { key: key(), occurred_at: at(9) })))
            .unwrap();
        assert_eq!(query.booking("b-1").unwrap().container_location.as_deref(), Some("unknown"));

        let (projection, query) = setup(LookupFallback::KeepExisting);
        let known = AccessKey::new("b-2", "g-2", "c-2");
        projection
            .apply(&envelope(1, AccessEvent::ContainerObtained(ContainerObtained { key: known, occurred_at: at(9) })))
            .unwrap();
        assert_eq!(query.booking("b-2").unwrap().container_location.as_deref(), Some("Hall B, bay 4"));
    }

    #[test]
    fn late_envelopes_do_not_roll_the_row_back() {
        let (projection, query) = setup(LookupFallback::KeepExisting);
        let k = key();
        let obtained = envelope(1, AccessEvent::ContainerObtained(ContainerObtained { key: k.clone(), occurred_at: at(9) }));
        let checked_in = envelope(2, AccessEvent::GuestCheckedIn(GuestCheckedIn { key: k, occurred_at: at(10) }));
        projection.apply(&obtained).unwrap();
        projection.apply(&checked_in).unwrap();
        let settled = query.booking("b-1").unwrap();

        projection.apply(&obtained).unwrap();
        projection.apply(&checked_in).unwrap();
        assert_eq!(query.booking("b-1").unwrap(), settled);
        assert_eq!(settled.status, BookingStatus::CheckedIn);
        assert_eq!(settled.last_position, Position::new(2));
    }

    #[test]
    fn events_for_another_container_leave_the_row_alone() {
        let (projection, query) = setup(LookupFallback::KeepExisting);
        projection
            .apply(&envelope(1, AccessEvent::ContainerObtained(ContainerObtained { key: key(), occurred_at: at(9) })))
            .unwrap();
        let other = AccessKey::new("b-1", "g-1", "c-2");
        projection
            .apply(&envelope(2, AccessEvent::GuestCheckedOut(GuestCheckedOut { key: other, occurred_at: at(11) })))
            .unwrap();

        let view = query.booking("b-1").unwrap();
        assert_eq!(view.container_id, "c-1");
        assert_eq!(view.status, BookingStatus::ContainerObtained);
        assert!(view.can_open_door);
    }

    #[test]
    fn events_for_unknown_bookings_are_dropped() {
        let (projection, query) = setup(LookupFallback::KeepExisting);
        projection
            .apply(&envelope(1, AccessEvent::GuestCheckedIn(GuestCheckedIn { key: key(), occurred_at: at(10) })))
            .unwrap();
        assert!(query.for_guest("g-1").unwrap().is_empty());
    }
}
