//! Race rating domain (event-sourced).
//!
//! Users rate races from 1 to 10, may revise their own rating, and a race can
//! be cancelled, after which it accepts nothing. Pure domain logic; no IO.

pub mod race;

pub use race::{
    CancelRace, RACE_TAG, RaceCancelled, RaceRated, RaceRating, RaceRatingCommand, RaceRatingEvent,
    RaceRatingUpdated, RaceRatings, RaceTarget, RateRace, Rating, USER_TAG, UpdateRaceRating,
};
