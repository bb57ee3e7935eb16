//! Command execution pipeline.
//!
//! ```text
//! Command
//!   ↓ target ids → correlation tags → criteria
//! 1. Read the matching history from the log
//!   ↓
//! 2. Decode + fold it into state (strict position order)
//!   ↓
//! 3. Decide (pure guards, produces events or a rejection)
//!   ↓
//! 4. Append with a condition: "nothing matching my criteria after what I read"
//!   ↓
//! 5. Publish committed events
//! ```
//!
//! A failed append condition means another writer touched the same entity in
//! between. The dispatcher then re-reads, re-folds and re-decides under a
//! bounded exponential backoff, so two racing commands end up serialized: the
//! loser observes the winner's events and its guards run against them.
//!
//! Commands for unrelated entities never share criteria and never conflict.

use std::thread;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use tagstream_core::{DomainError, EventSourcedState, Position, Tag};
use tagstream_events::{
    Command, Criteria, Event, EventBus, EventEnvelope, Projected, ProjectionError, TargetIdentifier,
    decode_all, project_state, resolve,
};

use crate::event_store::{AppendCondition, EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::retry::RetryPolicy;

/// How a failure must be treated by the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// A guard declined the command; nothing was appended.
    Rejection,
    /// Another writer won the race and retries were exhausted; safe to retry.
    Conflict,
    /// Infrastructure failure; the whole operation may be retried.
    System,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Business rejection (validation, duplicate, invalid transition, not found).
    #[error("rejected: {0}")]
    Rejected(DomainError),

    /// The append condition kept failing.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    /// The stored history could not be folded into state.
    #[error("history could not be folded: {0}")]
    History(#[from] ProjectionError),

    #[error("event log failure: {0}")]
    Store(EventStoreError),
}

impl DispatchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DispatchError::Rejected(_) => FailureKind::Rejection,
            DispatchError::Concurrency(_) => FailureKind::Conflict,
            DispatchError::History(_) | DispatchError::Store(_) => FailureKind::System,
        }
    }

    /// The domain reason, for rejections.
    pub fn rejection(&self) -> Option<&DomainError> {
        match self {
            DispatchError::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        DispatchError::Rejected(value)
    }
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg),
            other => DispatchError::Store(other),
        }
    }
}

/// Result of an accepted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReceipt {
    /// The committed events, in position order. Empty when the command decided
    /// nothing needed to change.
    pub events: Vec<StoredEvent>,
    /// Position of the last committed event, or the last observed position
    /// when nothing was appended.
    pub position: Position,
}

impl CommandReceipt {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Command execution engine shared by every domain.
///
/// The store and bus are injected; in tests both are in-memory.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    retry: RetryPolicy,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self::with_retry(store, bus, RetryPolicy::default())
    }

    pub fn with_retry(store: S, bus: B, retry: RetryPolicy) -> Self {
        Self { store, bus, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Run `command` against the state `St` rebuilt from its target's history.
    pub fn dispatch<St>(&self, command: St::Command) -> Result<CommandReceipt, DispatchError>
    where
        St: EventSourcedState<Error = DomainError>,
        St::Command: Command,
        St::Event: Event + Serialize + DeserializeOwned,
    {
        let command_type = command.command_type();
        let criteria = criteria_for::<St::Event>(&command.target().correlation_tags()?)?;

        let mut retry = 0u32;
        loop {
            let projected = self.fold::<St>(&criteria)?;

            let decided = match projected.state.decide(&command) {
                Ok(events) => events,
                Err(err) => {
                    info!(command = command_type, reason = %err, "command rejected");
                    return Err(DispatchError::Rejected(err));
                }
            };

            if decided.is_empty() {
                debug!(command = command_type, "command accepted without changes");
                return Ok(CommandReceipt {
                    events: vec![],
                    position: projected.last_position,
                });
            }

            let uncommitted = decided
                .iter()
                .map(UncommittedEvent::from_typed)
                .collect::<Result<Vec<_>, _>>()?;
            let condition = AppendCondition::after_read(criteria.clone(), projected.last_position);

            match self.store.append(uncommitted, Some(condition)) {
                Ok(committed) => {
                    self.publish(&committed);
                    let position = committed.last().map_or(projected.last_position, |e| e.position);
                    info!(
                        command = command_type,
                        events = committed.len(),
                        position = %position,
                        "command accepted"
                    );
                    return Ok(CommandReceipt {
                        events: committed,
                        position,
                    });
                }
                Err(EventStoreError::Concurrency(msg)) => {
                    retry += 1;
                    let Some(delay) = self.retry.delay_for(retry) else {
                        warn!(command = command_type, retries = retry - 1, reason = %msg, "append conflict, giving up");
                        return Err(DispatchError::Concurrency(msg));
                    };
                    debug!(command = command_type, retry, delay_ms = delay.as_millis() as u64, "append conflict, re-reading state");
                    thread::sleep(delay);
                }
                Err(other) => return Err(DispatchError::Store(other)),
            }
        }
    }

    /// Rebuild the current state of the entity known by `target`.
    pub fn load<St>(&self, target: &impl TargetIdentifier) -> Result<Projected<St>, DispatchError>
    where
        St: EventSourcedState,
        St::Event: Event + DeserializeOwned,
    {
        let criteria = criteria_for::<St::Event>(&target.correlation_tags()?)?;
        self.fold::<St>(&criteria)
    }

    fn fold<St>(&self, criteria: &Criteria) -> Result<Projected<St>, DispatchError>
    where
        St: EventSourcedState,
        St::Event: Event + DeserializeOwned,
    {
        let history = self.store.read(criteria)?;
        let envelopes = decode_all::<St::Event>(history.into_iter().map(StoredEvent::into_envelope))?;
        Ok(project_state::<St>(&envelopes)?)
    }

    fn publish(&self, committed: &[StoredEvent]) {
        for stored in committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                // Already durable; workers catch up from the log.
                warn!(position = %stored.position, error = %err, "publish failed after append");
            }
        }
    }
}

fn criteria_for<E: Event>(tags: &[Tag]) -> Result<Criteria, DispatchError> {
    Ok(resolve(tags, E::event_types())?)
}
