//! Read-model projections and the tooling around them.
//!
//! Projections consume committed events and build query-optimized views.
//! All projections are:
//! - **Rebuildable**: reset and replay the log to reproduce the view
//! - **Idempotent**: keyed upserts only, safe for at-least-once delivery
//! - **Explicit about lookups**: every cross-entity lookup names its fallback

pub mod cursor_store;
pub mod lookup;
pub mod replay;

pub mod appointments;
pub mod booking_overview;
pub mod race_ratings;

pub use cursor_store::{InMemoryCursorStore, ProjectionCursorStore};
pub use lookup::{Directory, InMemoryDirectory, Lookup, LookupFallback};
pub use replay::{ReplayError, ReplayHandle, ReplayPhase, ReplayProgress, replay_projection};

pub use appointments::{AppointmentRecord, AppointmentStatus, AppointmentsProjection, AppointmentsQuery};
pub use booking_overview::{BookingOverview, BookingOverviewProjection, BookingOverviewQuery, BookingStatus};
pub use race_ratings::{RaceRatingSummary, RaceRatingView, RaceRatingsProjection, RaceRatingsQuery, UserRatingView};
