use tagstream_core::EventSourcedState;

/// Decide and evolve in one pure step (no IO, no log).
///
/// Returns the state after folding the decided events together with the events
/// themselves. A rejection leaves the caller's state untouched because `state`
/// is taken by value and only returned on success.
///
/// For the full pipeline (criteria, read, append, publish) use
/// `CommandDispatcher::dispatch` in the infra crate.
pub fn execute<S>(state: S, command: &S::Command) -> Result<(S, Vec<S::Event>), S::Error>
where
    S: EventSourcedState,
{
    let events = state.decide(command)?;
    let next = events.iter().fold(state, S::evolve);
    Ok((next, events))
}
