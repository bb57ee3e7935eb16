//! State projector: fold an ordered history into an entity state.
//!
//! Folding is strict. Events must arrive in increasing log position, every
//! stored type must belong to the event family, and a payload that cannot be
//! decoded fails the whole projection. No default state is ever substituted
//! for an unreadable history.

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use tagstream_core::{EventSourcedState, Position};

use crate::{Event, EventEnvelope, ProjectionError};

/// Result of folding a history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projected<S> {
    pub state: S,
    /// Position of the last folded event (`Position::ZERO` for an empty history).
    pub last_position: Position,
    /// Number of events folded.
    pub matched: usize,
}

impl<S> Projected<S> {
    /// True when no event matched the criteria (the entity has no history).
    pub fn is_empty(&self) -> bool {
        self.matched == 0
    }
}

/// Fold `events` into `initial` with `fold`, enforcing strict log order.
pub fn project<'a, S, E, F>(
    events: impl IntoIterator<Item = &'a EventEnvelope<E>>,
    initial: S,
    mut fold: F,
) -> Result<Projected<S>, ProjectionError>
where
    E: 'a,
    F: FnMut(S, &E) -> S,
{
    let mut state = initial;
    let mut last = Position::ZERO;
    let mut matched = 0usize;

    for env in events {
        let found = env.position();
        if found <= last {
            return Err(ProjectionError::NonMonotonicPosition { last, found });
        }
        state = fold(state, env.payload());
        last = found;
        matched += 1;
    }

    Ok(Projected {
        state,
        last_position: last,
        matched,
    })
}

/// Fold with an [`EventSourcedState`]'s own `initial`/`evolve` pair.
pub fn project_state<'a, S>(
    events: impl IntoIterator<Item = &'a EventEnvelope<S::Event>>,
) -> Result<Projected<S>, ProjectionError>
where
    S: EventSourcedState,
    S::Event: 'a,
{
    project(events, S::initial(), S::evolve)
}

/// Decode a JSON envelope into the typed event family.
///
/// The stored type name must be one of `E::event_types()`; anything else is a
/// programming error and fails closed. The decoded payload must also report the
/// stored type name.
pub fn decode<E>(envelope: EventEnvelope<JsonValue>) -> Result<EventEnvelope<E>, ProjectionError>
where
    E: Event + DeserializeOwned,
{
    if !E::event_types().contains(&envelope.event_type()) {
        return Err(ProjectionError::UnknownEventType(envelope.event_type().to_string()));
    }

    let undecodable = |reason: String| ProjectionError::Deserialize {
        event_type: envelope.event_type().to_string(),
        position: envelope.position(),
        reason,
    };
    let payload: E = serde_json::from_value(envelope.payload().clone()).map_err(|e| undecodable(e.to_string()))?;
    if payload.event_type() != envelope.event_type() {
        return Err(undecodable(format!("payload decodes as {}", payload.event_type())));
    }

    Ok(envelope.map_payload(|_| payload))
}

/// Decode a whole history, preserving order.
pub fn decode_all<E>(
    envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
) -> Result<Vec<EventEnvelope<E>>, ProjectionError>
where
    E: Event + DeserializeOwned,
{
    envelopes.into_iter().map(decode::<E>).collect()
}
