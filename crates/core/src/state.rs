//! Event-sourced entity state contract (pure, deterministic).

/// Transient entity state derived by folding an ordered event history.
///
/// - **State evolution**: `evolve(self, event)` is a reducer returning the next value.
/// - **Decision logic**: `decide(&self, command)` checks guards and returns new events.
///
/// Implementations must not perform IO or read clocks/randomness: the state after
/// folding `E1..En` is a pure function of that sequence. Timestamps and generated
/// identifiers travel inside commands and events.
pub trait EventSourcedState: Clone + core::fmt::Debug + Sized {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Explicit empty state every rebuild starts from.
    fn initial() -> Self;

    /// Fold one event into the state.
    ///
    /// Must be total over the event family: every variant has a step.
    fn evolve(self, event: &Self::Event) -> Self;

    /// Validate `command` against the current state and decide which events to emit.
    ///
    /// A rejection returns `Err` and emits nothing. Must not mutate state.
    fn decide(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Fold a whole in-memory sequence from [`EventSourcedState::initial`].
    fn replay<'a>(events: impl IntoIterator<Item = &'a Self::Event>) -> Self
    where
        Self::Event: 'a,
    {
        events.into_iter().fold(Self::initial(), Self::evolve)
    }
}
