use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tagstream_core::{DomainError, DomainResult, EventSourcedState, Lifecycle, Tag, TagSet};
use tagstream_events::{Command, Event, TargetIdentifier};

pub const RACE_TAG: &str = "Race";
pub const USER_TAG: &str = "User";

/// A rating value, 1 to 10 inclusive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: i32) -> DomainResult<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "rating must be between {} and {}, got {value}",
                    Self::MIN,
                    Self::MAX
                ))
            })
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

/// One user's rating of a race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceRating {
    pub rating: Rating,
    pub comment: Option<String>,
}

/// Ratings of a race that is still open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenRace {
    ratings: BTreeMap<String, RaceRating>,
}

/// A cancelled race keeps the ratings it had.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledRace {
    ratings: BTreeMap<String, RaceRating>,
    reason: String,
}

/// State of one race's ratings, rebuilt from events tagged with the race.
///
/// `Unset` until the first rating (or a cancellation) arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RaceRatings {
    lifecycle: Lifecycle<OpenRace, CancelledRace>,
}

impl RaceRatings {
    pub fn lifecycle(&self) -> &Lifecycle<OpenRace, CancelledRace> {
        &self.lifecycle
    }

    pub fn is_cancelled(&self) -> bool {
        self.lifecycle.is_terminal()
    }

    pub fn cancellation_reason(&self) -> Option<&str> {
        self.lifecycle.terminal().map(|c| c.reason.as_str())
    }

    pub fn ratings(&self) -> Option<&BTreeMap<String, RaceRating>> {
        match &self.lifecycle {
            Lifecycle::Unset => None,
            Lifecycle::Active(open) => Some(&open.ratings),
            Lifecycle::Terminal(cancelled) => Some(&cancelled.ratings),
        }
    }

    /// Current rating value given by `user_id`.
    pub fn rating_of(&self, user_id: &str) -> Option<u8> {
        self.ratings()?.get(user_id).map(|r| r.rating.value())
    }

    pub fn average(&self) -> Option<f64> {
        let ratings = self.ratings()?;
        if ratings.is_empty() {
            return None;
        }
        let sum: u32 = ratings.values().map(|r| u32::from(r.rating.value())).sum();
        Some(f64::from(sum) / ratings.len() as f64)
    }
}

// --- commands ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRace {
    pub race_id: String,
    pub user_id: String,
    /// Raw input; validated against [`Rating`] bounds.
    pub rating: i32,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRaceRating {
    pub race_id: String,
    pub user_id: String,
    pub rating: i32,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelRace {
    pub race_id: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceRatingCommand {
    Rate(RateRace),
    UpdateRating(UpdateRaceRating),
    Cancel(CancelRace),
}

impl RaceRatingCommand {
    pub fn race_id(&self) -> &str {
        match self {
            RaceRatingCommand::Rate(c) => &c.race_id,
            RaceRatingCommand::UpdateRating(c) => &c.race_id,
            RaceRatingCommand::Cancel(c) => &c.race_id,
        }
    }
}

/// Every race-rating command targets the race; the user is part of the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceTarget(pub String);

impl TargetIdentifier for RaceTarget {
    fn correlation_tags(&self) -> DomainResult<Vec<Tag>> {
        Ok(vec![Tag::new(RACE_TAG, self.0.clone())?])
    }
}

impl Command for RaceRatingCommand {
    type Target = RaceTarget;

    fn command_type(&self) -> &'static str {
        match self {
            RaceRatingCommand::Rate(_) => "rating.rate_race",
            RaceRatingCommand::UpdateRating(_) => "rating.update_race_rating",
            RaceRatingCommand::Cancel(_) => "rating.cancel_race",
        }
    }

    fn target(&self) -> RaceTarget {
        RaceTarget(self.race_id().to_string())
    }
}

// --- events ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceRated {
    pub race_id: String,
    pub user_id: String,
    pub rating: Rating,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceRatingUpdated {
    pub race_id: String,
    pub user_id: String,
    pub previous_rating: Rating,
    pub rating: Rating,
    pub comment: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceCancelled {
    pub race_id: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceRatingEvent {
    RaceRated(RaceRated),
    RaceRatingUpdated(RaceRatingUpdated),
    RaceCancelled(RaceCancelled),
}

impl RaceRatingEvent {
    pub const RATED: &'static str = "rating.race.rated";
    pub const RATING_UPDATED: &'static str = "rating.race.rating_updated";
    pub const CANCELLED: &'static str = "rating.race.cancelled";
}

impl Event for RaceRatingEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RaceRatingEvent::RaceRated(_) => Self::RATED,
            RaceRatingEvent::RaceRatingUpdated(_) => Self::RATING_UPDATED,
            RaceRatingEvent::RaceCancelled(_) => Self::CANCELLED,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RaceRatingEvent::RaceRated(e) => e.occurred_at,
            RaceRatingEvent::RaceRatingUpdated(e) => e.occurred_at,
            RaceRatingEvent::RaceCancelled(e) => e.occurred_at,
        }
    }

    fn tags(&self) -> DomainResult<TagSet> {
        let tags = match self {
            RaceRatingEvent::RaceRated(RaceRated { race_id, user_id, .. })
            | RaceRatingEvent::RaceRatingUpdated(RaceRatingUpdated { race_id, user_id, .. }) => TagSet::new()
                .with(Tag::new(RACE_TAG, race_id.clone())?)
                .with(Tag::new(USER_TAG, user_id.clone())?),
            RaceRatingEvent::RaceCancelled(e) => TagSet::new().with(Tag::new(RACE_TAG, e.race_id.clone())?),
        };
        Ok(tags)
    }

    fn event_types() -> &'static [&'static str] {
        &[Self::RATED, Self::RATING_UPDATED, Self::CANCELLED]
    }
}

// --- state machine ---

impl EventSourcedState for RaceRatings {
    type Command = RaceRatingCommand;
    type Event = RaceRatingEvent;
    type Error = DomainError;

    fn initial() -> Self {
        Self::default()
    }

    fn evolve(self, event: &RaceRatingEvent) -> Self {
        let lifecycle = match (self.lifecycle, event) {
            (Lifecycle::Unset, RaceRatingEvent::RaceRated(e)) => {
                let mut open = OpenRace::default();
                open.ratings.insert(e.user_id.clone(), rating_entry(e.rating, &e.comment));
                Lifecycle::Active(open)
            }
            (Lifecycle::Active(mut open), RaceRatingEvent::RaceRated(e)) => {
                open.ratings.insert(e.user_id.clone(), rating_entry(e.rating, &e.comment));
                Lifecycle::Active(open)
            }
            (Lifecycle::Active(mut open), RaceRatingEvent::RaceRatingUpdated(e)) => {
                open.ratings.insert(e.user_id.clone(), rating_entry(e.rating, &e.comment));
                Lifecycle::Active(open)
            }
            (Lifecycle::Unset, RaceRatingEvent::RaceCancelled(e)) => Lifecycle::Terminal(CancelledRace {
                ratings: BTreeMap::new(),
                reason: e.reason.clone(),
            }),
            (Lifecycle::Active(open), RaceRatingEvent::RaceCancelled(e)) => Lifecycle::Terminal(CancelledRace {
                ratings: open.ratings,
                reason: e.reason.clone(),
            }),
            // Guards never emit these; a terminal race and an update without a
            // prior rating stay as they are.
            (unchanged @ Lifecycle::Unset, RaceRatingEvent::RaceRatingUpdated(_))
            | (unchanged @ Lifecycle::Terminal(_), _) => unchanged,
        };
        Self { lifecycle }
    }

    fn decide(&self, command: &RaceRatingCommand) -> DomainResult<Vec<RaceRatingEvent>> {
        match command {
            RaceRatingCommand::Rate(cmd) => self.decide_rate(cmd),
            RaceRatingCommand::UpdateRating(cmd) => self.decide_update(cmd),
            RaceRatingCommand::Cancel(cmd) => self.decide_cancel(cmd),
        }
    }
}

fn rating_entry(rating: Rating, comment: &Option<String>) -> RaceRating {
    RaceRating {
        rating,
        comment: comment.clone(),
    }
}

impl RaceRatings {
    fn race_entity(race_id: &str) -> String {
        format!("race {race_id}")
    }

    fn decide_rate(&self, cmd: &RateRace) -> DomainResult<Vec<RaceRatingEvent>> {
        self.lifecycle.ensure_not_terminal(&Self::race_entity(&cmd.race_id))?;
        Tag::new(USER_TAG, cmd.user_id.clone())?;
        let rating = Rating::new(cmd.rating)?;

        if self.rating_of(&cmd.user_id).is_some() {
            return Err(DomainError::duplicate(format!(
                "user {} already rated race {}",
                cmd.user_id, cmd.race_id
            )));
        }

        Ok(vec![RaceRatingEvent::RaceRated(RaceRated {
            race_id: cmd.race_id.clone(),
            user_id: cmd.user_id.clone(),
            rating,
            comment: cmd.comment.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn decide_update(&self, cmd: &UpdateRaceRating) -> DomainResult<Vec<RaceRatingEvent>> {
        self.lifecycle.ensure_not_terminal(&Self::race_entity(&cmd.race_id))?;
        let rating = Rating::new(cmd.rating)?;

        let previous = self
            .ratings()
            .and_then(|r| r.get(&cmd.user_id))
            .ok_or_else(|| {
                DomainError::not_found(format!(
                    "user {} has not rated race {}",
                    cmd.user_id, cmd.race_id
                ))
            })?;

        if previous.rating == rating && previous.comment == cmd.comment {
            return Ok(vec![]);
        }

        Ok(vec![RaceRatingEvent::RaceRatingUpdated(RaceRatingUpdated {
            race_id: cmd.race_id.clone(),
            user_id: cmd.user_id.clone(),
            previous_rating: previous.rating,
            rating,
            comment: cmd.comment.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn decide_cancel(&self, cmd: &CancelRace) -> DomainResult<Vec<RaceRatingEvent>> {
        self.lifecycle.ensure_not_terminal(&Self::race_entity(&cmd.race_id))?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("cancellation reason cannot be empty"));
        }

        Ok(vec![RaceRatingEvent::RaceCancelled(RaceCancelled {
            race_id: cmd.race_id.clone(),
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}
