use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tagstream_core::{DomainError, DomainResult, EventSourcedState, Lifecycle, Tag, TagSet};
use tagstream_events::{Command, Event, TargetIdentifier};

pub const BOOKING_TAG: &str = "Booking";
pub const GUEST_TAG: &str = "Guest";
pub const CONTAINER_TAG: &str = "Container";

/// The three correlated ids of one container access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessKey {
    pub booking_id: String,
    pub guest_id: String,
    pub container_id: String,
}

impl AccessKey {
    pub fn new(booking_id: impl Into<String>, guest_id: impl Into<String>, container_id: impl Into<String>) -> Self {
        Self {
            booking_id: booking_id.into(),
            guest_id: guest_id.into(),
            container_id: container_id.into(),
        }
    }

    fn tag_set(&self) -> DomainResult<TagSet> {
        Ok(self.correlation_tags()?.into_iter().collect())
    }
}

impl TargetIdentifier for AccessKey {
    fn correlation_tags(&self) -> DomainResult<Vec<Tag>> {
        Ok(vec![
            Tag::new(BOOKING_TAG, self.booking_id.clone())?,
            Tag::new(GUEST_TAG, self.guest_id.clone())?,
            Tag::new(CONTAINER_TAG, self.container_id.clone())?,
        ])
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Occupancy {
    Reserved,
    Occupied,
}

impl core::fmt::Display for Occupancy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Occupancy::Reserved => f.write_str("RESERVED"),
            Occupancy::Occupied => f.write_str("OCCUPIED"),
        }
    }
}

/// Who currently holds a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub booking_id: String,
    pub guest_id: String,
    pub status: Occupancy,
    pub door_requested: bool,
}

/// Last holder of a container after checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vacated {
    pub booking_id: String,
    pub guest_id: String,
}

type ContainerLifecycle = Lifecycle<Holding, Vacated>;

/// Access state folded from every event that shares the booking, the guest or
/// the container of a command.
///
/// Each container runs its own lifecycle. A checked-out container can be
/// obtained again by a different booking, which starts a new occupancy; a
/// checked-out booking is final.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerAccess {
    containers: BTreeMap<String, ContainerLifecycle>,
    checked_out: BTreeSet<String>,
}

impl ContainerAccess {
    pub fn container(&self, container_id: &str) -> Option<&ContainerLifecycle> {
        self.containers.get(container_id)
    }

    pub fn holder_of(&self, container_id: &str) -> Option<&Holding> {
        match self.containers.get(container_id)? {
            Lifecycle::Active(h) => Some(h),
            _ => None,
        }
    }

    pub fn is_checked_out(&self, booking_id: &str) -> bool {
        self.checked_out.contains(booking_id)
    }

    /// The container `booking_id` currently holds, if any. A booking holds at
    /// most one container at a time.
    pub fn held_by(&self, booking_id: &str) -> Option<&str> {
        self.containers.iter().find_map(|(id, lifecycle)| match lifecycle {
            Lifecycle::Active(h) if h.booking_id == booking_id => Some(id.as_str()),
            _ => None,
        })
    }

    /// The occupancy `booking_id` sees on its container.
    ///
    /// A container vacated by another booking is free again.
    fn occupancy(&self, key: &AccessKey) -> ContainerLifecycle {
        match self.containers.get(&key.container_id) {
            None => Lifecycle::Unset,
            Some(Lifecycle::Terminal(v)) if v.booking_id != key.booking_id => Lifecycle::Unset,
            Some(other) => other.clone(),
        }
    }

    fn ensure_booking_open(&self, key: &AccessKey) -> DomainResult<()> {
        if self.is_checked_out(&key.booking_id) {
            return Err(DomainError::invalid_transition(format!(
                "booking {} already checked out",
                key.booking_id
            )));
        }
        Ok(())
    }

    /// Holding of the command's own booking; someone else's holding is a conflict.
    fn own_holding(&self, key: &AccessKey) -> DomainResult<Holding> {
        self.ensure_booking_open(key)?;
        let occupancy = self.occupancy(key);
        let holding = occupancy
            .require_active(&format!("container {} for booking {}", key.container_id, key.booking_id))
            .map_err(|e| match e {
                DomainError::NotFound(_) => DomainError::not_found(format!(
                    "container {} has not been obtained for booking {}",
                    key.container_id, key.booking_id
                )),
                other => other,
            })?;
        if holding.booking_id != key.booking_id {
            return Err(DomainError::conflict(format!(
                "container {} is held by another booking",
                key.container_id
            )));
        }
        Ok(holding.clone())
    }
}

// --- commands ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObtainContainer {
    pub key: AccessKey,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenContainerDoor {
    pub key: AccessKey,
    pub occurred_at: DateTime<Utc>,
}

/// Sent by the door controller once the lock reports open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmDoorUnlocked {
    pub key: AccessKey,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutGuest {
    pub key: AccessKey,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessCommand {
    ObtainContainer(ObtainContainer),
    OpenContainerDoor(OpenContainerDoor),
    ConfirmDoorUnlocked(ConfirmDoorUnlocked),
    CheckOutGuest(CheckOutGuest),
}

impl AccessCommand {
    pub fn key(&self) -> &AccessKey {
        match self {
            AccessCommand::ObtainContainer(c) => &c.key,
            AccessCommand::OpenContainerDoor(c) => &c.key,
            AccessCommand::ConfirmDoorUnlocked(c) => &c.key,
            AccessCommand::CheckOutGuest(c) => &c.key,
        }
    }
}

impl Command for AccessCommand {
    type Target = AccessKey;

    fn command_type(&self) -> &'static str {
        match self {
            AccessCommand::ObtainContainer(_) => "access.obtain_container",
            AccessCommand::OpenContainerDoor(_) => "access.open_container_door",
            AccessCommand::ConfirmDoorUnlocked(_) => "access.confirm_door_unlocked",
            AccessCommand::CheckOutGuest(_) => "access.check_out_guest",
        }
    }

    fn target(&self) -> AccessKey {
        self.key().clone()
    }
}

// --- events ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerObtained {
    pub key: AccessKey,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorOpeningRequested {
    pub key: AccessKey,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCheckedIn {
    pub key: AccessKey,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestCheckedOut {
    pub key: AccessKey,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessEvent {
    ContainerObtained(ContainerObtained),
    DoorOpeningRequested(DoorOpeningRequested),
    GuestCheckedIn(GuestCheckedIn),
    GuestCheckedOut(GuestCheckedOut),
}

impl AccessEvent {
    pub const CONTAINER_OBTAINED: &'static str = "access.container.obtained";
    pub const DOOR_OPENING_REQUESTED: &'static str = "access.door.opening_requested";
    pub const GUEST_CHECKED_IN: &'static str = "access.guest.checked_in";
    pub const GUEST_CHECKED_OUT: &'static str = "access.guest.checked_out";

    pub fn key(&self) -> &AccessKey {
        match self {
            AccessEvent::ContainerObtained(e) => &e.key,
            AccessEvent::DoorOpeningRequested(e) => &e.key,
            AccessEvent::GuestCheckedIn(e) => &e.key,
            AccessEvent::GuestCheckedOut(e) => &e.key,
        }
    }
}

impl Event for AccessEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccessEvent::ContainerObtained(_) => Self::CONTAINER_OBTAINED,
            AccessEvent::DoorOpeningRequested(_) => Self::DOOR_OPENING_REQUESTED,
            AccessEvent::GuestCheckedIn(_) => Self::GUEST_CHECKED_IN,
            AccessEvent::GuestCheckedOut(_) => Self::GUEST_CHECKED_OUT,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccessEvent::ContainerObtained(e) => e.occurred_at,
            AccessEvent::DoorOpeningRequested(e) => e.occurred_at,
            AccessEvent::GuestCheckedIn(e) => e.occurred_at,
            AccessEvent::GuestCheckedOut(e) => e.occurred_at,
        }
    }

    /// All three ids, so a later command known by any one of them finds the event.
    fn tags(&self) -> DomainResult<TagSet> {
        self.key().tag_set()
    }

    fn event_types() -> &'static [&'static str] {
        &[
            Self::CONTAINER_OBTAINED,
            Self::DOOR_OPENING_REQUESTED,
            Self::GUEST_CHECKED_IN,
            Self::GUEST_CHECKED_OUT,
        ]
    }
}

// --- state machine ---

impl EventSourcedState for ContainerAccess {
    type Command = AccessCommand;
    type Event = AccessEvent;
    type Error = DomainError;

    fn initial() -> Self {
        Self::default()
    }

    fn evolve(mut self, event: &AccessEvent) -> Self {
        let key = event.key();
        match event {
            AccessEvent::ContainerObtained(_) => {
                self.containers.insert(
                    key.container_id.clone(),
                    Lifecycle::Active(Holding {
                        booking_id: key.booking_id.clone(),
                        guest_id: key.guest_id.clone(),
                        status: Occupancy::Reserved,
                        door_requested: false,
                    }),
                );
            }
            AccessEvent::DoorOpeningRequested(_) => {
                if let Some(Lifecycle::Active(h)) = self.containers.get_mut(&key.container_id) {
                    if h.booking_id == key.booking_id {
                        h.door_requested = true;
                    }
                }
            }
            AccessEvent::GuestCheckedIn(_) => {
                if let Some(Lifecycle::Active(h)) = self.containers.get_mut(&key.container_id) {
                    if h.booking_id == key.booking_id {
                        h.status = Occupancy::Occupied;
                    }
                }
            }
            AccessEvent::GuestCheckedOut(_) => {
                self.containers.insert(
                    key.container_id.clone(),
                    Lifecycle::Terminal(Vacated {
                        booking_id: key.booking_id.clone(),
                        guest_id: key.guest_id.clone(),
                    }),
                );
                self.checked_out.insert(key.booking_id.clone());
            }
        }
        self
    }

    fn decide(&self, command: &AccessCommand) -> DomainResult<Vec<AccessEvent>> {
        let key = command.key();
        key.correlation_tags()?;

        match command {
            AccessCommand::ObtainContainer(cmd) => {
                self.ensure_booking_open(key)?;
                if let Lifecycle::Active(h) = self.occupancy(key) {
                    return Err(DomainError::conflict(format!(
                        "container {} is {}",
                        key.container_id, h.status
                    )));
                }
                if let Some(held) = self.held_by(&key.booking_id) {
                    return Err(DomainError::conflict(format!(
                        "booking {} already holds container {}",
                        key.booking_id, held
                    )));
                }
                Ok(vec![AccessEvent::ContainerObtained(ContainerObtained {
                    key: key.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            AccessCommand::OpenContainerDoor(cmd) => {
                self.own_holding(key)?;
                Ok(vec![AccessEvent::DoorOpeningRequested(DoorOpeningRequested {
                    key: key.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            AccessCommand::ConfirmDoorUnlocked(cmd) => {
                let holding = self.own_holding(key)?;
                if holding.status == Occupancy::Occupied {
                    return Err(DomainError::duplicate(format!(
                        "guest {} already checked in to container {}",
                        key.guest_id, key.container_id
                    )));
                }
                if !holding.door_requested {
                    return Err(DomainError::invalid_transition(format!(
                        "door of container {} was not requested to open",
                        key.container_id
                    )));
                }
                Ok(vec![AccessEvent::GuestCheckedIn(GuestCheckedIn {
                    key: key.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            AccessCommand::CheckOutGuest(cmd) => {
                let holding = self.own_holding(key)?;
                if holding.status != Occupancy::Occupied {
                    return Err(DomainError::invalid_transition(format!(
                        "guest {} has not checked in to container {}",
                        key.guest_id, key.container_id
                    )));
                }
                Ok(vec![AccessEvent::GuestCheckedOut(GuestCheckedOut {
                    key: key.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use tagstream_events::{execute, resolve};

    use super::*;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
    }

    fn key(booking: &str, guest: &str, container: &str) -> AccessKey {
        AccessKey::new(booking, guest, container)
    }

    fn obtain(k: &AccessKey) -> AccessCommand {
        AccessCommand::ObtainContainer(ObtainContainer {
            key: k.clone(),
            occurred_at: at(),
        })
    }

    fn open(k: &AccessKey) -> AccessCommand {
        AccessCommand::OpenContainerDoor(OpenContainerDoor {
            key: k.clone(),
            occurred_at: at(),
        })
    }

    fn unlocked(k: &AccessKey) -> AccessCommand {
        AccessCommand::ConfirmDoorUnlocked(ConfirmDoorUnlocked {
            key: k.clone(),
            occurred_at: at(),
        })
    }

    fn check_out(k: &AccessKey) -> AccessCommand {
        AccessCommand::CheckOutGuest(CheckOutGuest {
            key: k.clone(),
            occurred_at: at(),
        })
    }

    fn run(commands: &[AccessCommand]) -> (ContainerAccess, Vec<AccessEvent>) {
        let mut history = Vec::new();
        let mut state = ContainerAccess::initial();
        for cmd in commands {
            let (next, events) = execute(state, cmd).expect("command should be accepted");
            history.extend(events);
            state = next;
        }
        (state, history)
    }

    #[test]
    fn full_stay() {
        let k = key("b-1", "g-1", "c-1");
        let (state, history) = run(&[obtain(&k), open(&k), unlocked(&k), check_out(&k)]);

        assert_eq!(history.len(), 4);
        assert!(state.is_checked_out("b-1"));
        assert!(state.holder_of("c-1").is_none());
    }

    #[test]
    fn second_obtain_sees_the_reservation() {
        let first = key("b-1", "g-1", "c-1");
        let second = key("b-2", "g-2", "c-1");
        let (state, _) = run(&[obtain(&first)]);

        match state.decide(&obtain(&second)).unwrap_err() {
            DomainError::Conflict(msg) => assert!(msg.contains("RESERVED")),
            other => panic!("expected conflict, got {other:?}"),
        }

        let (state, _) = run(&[obtain(&first), open(&first), unlocked(&first)]);
        let err = state.decide(&obtain(&second)).unwrap_err();
        assert!(err.reason().contains("OCCUPIED"));
    }

    #[test]
    fn a_booking_holds_one_container_at_a_time() {
        let first = key("b-1", "g-1", "c-1");
        let second = key("b-1", "g-1", "c-2");
        let (state, _) = run(&[obtain(&first)]);

        match state.decide(&obtain(&second)).unwrap_err() {
            DomainError::Conflict(msg) => assert!(msg.contains("already holds container c-1")),
            other => panic!("expected conflict, got {other:?}"),
        }

        // After checkout c-2 was never taken, so another booking gets it.
        let (state, _) = run(&[obtain(&first), open(&first), unlocked(&first), check_out(&first)]);
        assert_eq!(state.held_by("b-1"), None);
        assert!(state.holder_of("c-2").is_none());
        let (state, _) = execute(state, &obtain(&key("b-2", "g-2", "c-2"))).unwrap();
        assert_eq!(state.held_by("b-2"), Some("c-2"));
    }

    #[test]
    fn open_requires_an_obtained_container() {
        let k = key("b-1", "g-1", "c-1");
        let err = ContainerAccess::initial().decide(&open(&k)).unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn another_booking_cannot_open_the_door() {
        let holder = key("b-1", "g-1", "c-1");
        let intruder = key("b-2", "g-2", "c-1");
        let (state, _) = run(&[obtain(&holder)]);
        assert!(matches!(state.decide(&open(&intruder)), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn checkout_is_final_for_the_booking() {
        let k = key("b-1", "g-1", "c-1");
        let (state, _) = run(&[obtain(&k), open(&k), unlocked(&k), check_out(&k)]);

        for cmd in [open(&k), obtain(&k), check_out(&k)] {
            let err = state.decide(&cmd).unwrap_err();
            assert!(matches!(err, DomainError::InvalidTransition(_)), "{cmd:?}");
        }
    }

    #[test]
    fn vacated_container_can_be_obtained_by_the_next_booking() {
        let first = key("b-1", "g-1", "c-1");
        let next = key("b-2", "g-2", "c-1");
        let (state, _) = run(&[obtain(&first), open(&first), unlocked(&first), check_out(&first)]);

        let (state, _) = execute(state, &obtain(&next)).unwrap();
        assert_eq!(state.holder_of("c-1").unwrap().booking_id, "b-2");
        // The old booking stays closed even though the container moved on.
        assert!(matches!(state.decide(&open(&first)), Err(DomainError::InvalidTransition(_))));
    }

    #[test]
    fn check_in_needs_a_door_request_and_happens_once() {
        let k = key("b-1", "g-1", "c-1");
        let (state, _) = run(&[obtain(&k)]);
        assert!(matches!(state.decide(&unlocked(&k)), Err(DomainError::InvalidTransition(_))));
        assert!(matches!(state.decide(&check_out(&k)), Err(DomainError::InvalidTransition(_))));

        let (state, _) = run(&[obtain(&k), open(&k), unlocked(&k)]);
        assert!(matches!(state.decide(&unlocked(&k)), Err(DomainError::Duplicate(_))));
        // Opening again while occupied is fine.
        assert_eq!(state.decide(&open(&k)).unwrap().len(), 1);
    }

    #[test]
    fn events_are_discoverable_by_any_id() {
        let k = key("b-1", "g-1", "c-1");
        let (_, history) = run(&[obtain(&k), open(&k)]);
        let tags = history[1].tags().unwrap();

        for tag in k.correlation_tags().unwrap() {
            let by_one = resolve(&[tag], AccessEvent::event_types()).unwrap();
            assert!(by_one.matches(history[1].event_type(), &tags));
        }
    }

    #[test]
    fn blank_ids_are_rejected() {
        let k = key("b-1", " ", "c-1");
        let err = ContainerAccess::initial().decide(&obtain(&k)).unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            /// Folding any accepted history twice yields the same state.
            #[test]
            fn fold_is_deterministic(steps in prop::collection::vec((0u8..4, 0u8..3, 0u8..2), 1..40)) {
                let mut state = ContainerAccess::initial();
                let mut history = Vec::new();
                for (action, booking, container) in steps {
                    let k = key(&format!("b-{booking}"), &format!("g-{booking}"), &format!("c-{container}"));
                    let cmd = match action {
                        0 => obtain(&k),
                        1 => open(&k),
                        2 => unlocked(&k),
                        _ => check_out(&k),
                    };
                    if let Ok((next, events)) = execute(state.clone(), &cmd) {
                        history.extend(events);
                        state = next;
                    }
                }

                prop_assert_eq!(ContainerAccess::replay(&history), ContainerAccess::replay(&history));
                prop_assert_eq!(ContainerAccess::replay(&history), state.clone());

                // No booking ever holds two containers, and a checked-out
                // booking holds none.
                for booking in 0u8..3 {
                    let id = format!("b-{booking}");
                    let holding = state
                        .containers
                        .values()
                        .filter(|l| matches!(l, Lifecycle::Active(h) if h.booking_id == id))
                        .count();
                    prop_assert!(holding <= 1);
                    if state.is_checked_out(&id) {
                        prop_assert_eq!(holding, 0);
                    }
                }
            }
        }
    }
}
