use chrono::{DateTime, Utc};

use tagstream_core::{DomainResult, TagSet};

/// A domain event family (one closed enum per domain).
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **versioned** (schema evolution)
/// - **tagged** with every correlation dimension under which they must later be found
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "rating.race.rated").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32 {
        1
    }

    /// When the event occurred (business time, supplied by the command).
    fn occurred_at(&self) -> DateTime<Utc>;

    /// Correlation tags stamped on the event at append time.
    fn tags(&self) -> DomainResult<TagSet>;

    /// Every type name the family can produce.
    ///
    /// State criteria select exactly these types, so a stored event outside this
    /// list can never be folded.
    fn event_types() -> &'static [&'static str]
    where
        Self: Sized;
}
