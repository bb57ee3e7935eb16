use tagstream_core::{DomainResult, Tag};

/// Something that names the entity a command targets.
///
/// A target is known by one or more correlated ids (a race rating by race and
/// user, a container access by booking, guest and container). Each id becomes
/// one correlation tag.
pub trait TargetIdentifier {
    fn correlation_tags(&self) -> DomainResult<Vec<Tag>>;
}

impl TargetIdentifier for Tag {
    fn correlation_tags(&self) -> DomainResult<Vec<Tag>> {
        Ok(vec![self.clone()])
    }
}

impl TargetIdentifier for Vec<Tag> {
    fn correlation_tags(&self) -> DomainResult<Vec<Tag>> {
        Ok(self.clone())
    }
}

/// A request to change state.
///
/// Commands are transient intents. They are validated against the state
/// derived from the target's history and either rejected as a whole or turned
/// into events. Commands are not deduplicated; exactly-once requirements are
/// expressed as explicit state checks in `decide`.
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    type Target: TargetIdentifier;

    /// Stable command name, used in logs.
    fn command_type(&self) -> &'static str;

    fn target(&self) -> Self::Target;
}
