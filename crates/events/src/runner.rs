//! Projection runner: cursor tracking and rebuild.
//!
//! Read models are disposable; the log is the source of truth. The runner
//! feeds envelopes to a projection in log order and remembers the last
//! position it acknowledged.

use serde_json::Value as JsonValue;

use tagstream_core::Position;

use crate::{EventEnvelope, Projection, ProjectionError};

/// What happened to one envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The projection consumed the event.
    Applied,
    /// Not a type the projection handles; the cursor still moves past it.
    Ignored,
    /// At or below the cursor (re-delivery); nothing changed.
    Skipped,
}

#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: Position,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self::with_cursor(projection, Position::ZERO)
    }

    /// Resume from a persisted cursor.
    pub fn with_cursor(projection: P, cursor: Position) -> Self {
        Self { projection, cursor }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    /// Last acknowledged log position.
    pub fn cursor(&self) -> Position {
        self.cursor
    }

    /// Apply one envelope. On error the cursor does not move.
    pub fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        let position = envelope.position();
        if position <= self.cursor {
            return Ok(Applied::Skipped);
        }

        if !self.projection.handles(envelope.event_type()) {
            self.cursor = position;
            return Ok(Applied::Ignored);
        }

        self.projection.apply(envelope)?;
        self.cursor = position;
        Ok(Applied::Applied)
    }

    /// Apply many envelopes in order, stopping at the first failure.
    ///
    /// Returns how many envelopes the projection actually consumed.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<JsonValue>>,
    ) -> Result<usize, ProjectionError> {
        let mut applied = 0;
        for env in envelopes {
            if self.apply(env)? == Applied::Applied {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Reset the view and replay the full history from position zero.
    pub fn rebuild_from_scratch<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<JsonValue>>,
    ) -> Result<usize, ProjectionError> {
        self.projection.reset()?;
        self.cursor = Position::ZERO;
        self.run(envelopes)
    }

    pub fn into_inner(self) -> (P, Position) {
        (self.projection, self.cursor)
    }
}
