//! Race ratings view: every user's current rating per race, plus averages.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use tagstream_core::Position;
use tagstream_events::{Event, EventEnvelope, Projection, ProjectionError, decode};
use tagstream_rating::{RaceRatingEvent, Rating};

use crate::query::{QueryResult, found};
use crate::read_model::ReadModelStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRatingView {
    pub rating: u8,
    pub comment: Option<String>,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceRatingView {
    pub race_id: String,
    /// Keyed by user id.
    pub ratings: BTreeMap<String, UserRatingView>,
    pub cancelled: bool,
    pub cancellation_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Log position of the last event folded into this race.
    pub last_position: Position,
}

impl RaceRatingView {
    fn empty(race_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            race_id: race_id.to_string(),
            ratings: BTreeMap::new(),
            cancelled: false,
            cancellation_reason: None,
            updated_at: at,
            last_position: Position::ZERO,
        }
    }

    pub fn average(&self) -> Option<f64> {
        if self.ratings.is_empty() {
            return None;
        }
        let sum: u32 = self.ratings.values().map(|r| u32::from(r.rating)).sum();
        Some(f64::from(sum) / self.ratings.len() as f64)
    }
}

/// Compact answer for "how is this race rated".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceRatingSummary {
    pub race_id: String,
    pub average: Option<f64>,
    pub count: usize,
    pub cancelled: bool,
}

pub struct RaceRatingsProjection<S> {
    store: S,
}

impl<S> RaceRatingsProjection<S>
where
    S: ReadModelStore<String, RaceRatingView>,
{
    pub const NAME: &'static str = "race_ratings";

    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Fold one event into the race's view unless the view already covers
    /// `position`.
    fn fold<F>(&self, race_id: &str, position: Position, at: DateTime<Utc>, change: F) -> Result<(), ProjectionError>
    where
        F: FnOnce(&mut RaceRatingView),
    {
        let mut view = self
            .store
            .get(&race_id.to_string())?
            .unwrap_or_else(|| RaceRatingView::empty(race_id, at));
        if view.last_position >= position {
            return Ok(());
        }
        change(&mut view);
        view.updated_at = at;
        view.last_position = position;
        self.store.upsert(race_id.to_string(), view)?;
        Ok(())
    }

    fn rate(
        &self,
        position: Position,
        race_id: &str,
        user_id: &str,
        rating: Rating,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), ProjectionError> {
        self.fold(race_id, position, at, |view| {
            view.ratings.insert(
                user_id.to_string(),
                UserRatingView {
                    rating: rating.value(),
                    comment,
                    rated_at: at,
                },
            );
        })
    }
}

impl<S> Projection for RaceRatingsProjection<S>
where
    S: ReadModelStore<String, RaceRatingView>,
{
    fn name(&self) -> &str {
        Self::NAME
    }

    fn event_types(&self) -> &[&'static str] {
        RaceRatingEvent::event_types()
    }

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let position = envelope.position();
        match decode::<RaceRatingEvent>(envelope.clone())?.into_payload() {
            RaceRatingEvent::RaceRated(e) => {
                self.rate(position, &e.race_id, &e.user_id, e.rating, e.comment, e.occurred_at)
            }
            RaceRatingEvent::RaceRatingUpdated(e) => {
                self.rate(position, &e.race_id, &e.user_id, e.rating, e.comment, e.occurred_at)
            }
            RaceRatingEvent::RaceCancelled(e) => self.fold(&e.race_id, position, e.occurred_at, |view| {
                view.cancelled = true;
                view.cancellation_reason = Some(e.reason);
            }),
        }
    }

    fn reset(&self) -> Result<(), ProjectionError> {
        self.store.clear()?;
        Ok(())
    }
}

/// Read-only access to the race ratings view.
pub struct RaceRatingsQuery<S> {
    store: S,
}

impl<S> RaceRatingsQuery<S>
where
    S: ReadModelStore<String, RaceRatingView>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn race(&self, race_id: &str) -> QueryResult<RaceRatingView> {
        found(self.store.get(&race_id.to_string())?, || format!("race {race_id}"))
    }

    pub fn summary(&self, race_id: &str) -> QueryResult<RaceRatingSummary> {
        let view = self.race(race_id)?;
        Ok(RaceRatingSummary {
            race_id: view.race_id.clone(),
            average: view.average(),
            count: view.ratings.len(),
            cancelled: view.cancelled,
        })
    }

    pub fn user_rating(&self, race_id: &str, user_id: &str) -> QueryResult<UserRatingView> {
        let mut view = self.race(race_id)?;
        found(view.ratings.remove(user_id), || {
            format!("rating of user {user_id} for race {race_id}")
        })
    }

    /// Races ordered by best average first; unrated races last.
    pub fn top_rated(&self, limit: usize) -> QueryResult<Vec<RaceRatingSummary>> {
        let mut summaries: Vec<RaceRatingSummary> = self
            .store
            .list()?
            .into_iter()
            .filter(|v| !v.cancelled)
            .map(|v| RaceRatingSummary {
                average: v.average(),
                count: v.ratings.len(),
                cancelled: v.cancelled,
                race_id: v.race_id,
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.average
                .unwrap_or(f64::MIN)
                .total_cmp(&a.average.unwrap_or(f64::MIN))
                .then_with(|| a.race_id.cmp(&b.race_id))
        });
        summaries.truncate(limit);
        Ok(summaries)
    }
}
