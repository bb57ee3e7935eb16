use thiserror::Error;

use tagstream_core::Position;

/// Failure while folding history or applying an event to a read model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    /// The payload could not be decoded into the typed event family.
    #[error("failed to deserialize '{event_type}' at position {position}: {reason}")]
    Deserialize {
        event_type: String,
        position: Position,
        reason: String,
    },

    /// The event type is not part of the family being folded (programming error).
    #[error("unknown event type '{0}'")]
    UnknownEventType(String),

    /// Events were handed over out of log order.
    #[error("non-monotonic position (last={last}, found={found})")]
    NonMonotonicPosition { last: Position, found: Position },

    /// The read-model store rejected the write.
    #[error("read model store failure: {0}")]
    Store(String),
}
