use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::{EventEnvelope, ProjectionError};

/// A read-model projection: turns log events into a query-optimized view.
///
/// Projections consume the JSON form of committed envelopes so one worker can
/// feed views that span several event families.
///
/// ## Idempotency
///
/// Delivery is at-least-once. The [`ProjectionRunner`](crate::ProjectionRunner)
/// skips envelopes at or below its cursor, which catches re-delivery through
/// the runner. `apply` itself must write through keyed upserts and removals
/// (never blind increments) and keep the log position last folded into each
/// record, ignoring envelopes at or below it. Only then does a repeated or
/// late envelope that bypasses the runner leave the view unchanged.
///
/// ## Rebuild
///
/// Views are disposable. `reset` clears everything the projection owns; replaying
/// the full log afterwards must reproduce an identical view.
///
/// ## Errors
///
/// A failing `apply` is retried against the same envelope. The caller does not
/// advance its cursor until the apply succeeds.
pub trait Projection: Send + Sync {
    /// Stable name, used as the cursor key.
    fn name(&self) -> &str;

    /// Type names this projection consumes. Other events are acknowledged
    /// without being applied.
    fn event_types(&self) -> &[&'static str];

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError>;

    /// Drop every record this projection owns.
    fn reset(&self) -> Result<(), ProjectionError>;

    fn handles(&self, event_type: &str) -> bool {
        self.event_types().contains(&event_type)
    }
}

impl<P> Projection for Arc<P>
where
    P: Projection + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    fn event_types(&self) -> &[&'static str] {
        (**self).event_types()
    }

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        (**self).apply(envelope)
    }

    fn reset(&self) -> Result<(), ProjectionError> {
        (**self).reset()
    }
}
