//! Container access domain (event-sourced).
//!
//! A guest obtains a storage container for a booking, asks for its door to be
//! opened, is checked in once the door reports unlocked and eventually checks
//! out. Every event is tagged by booking, guest and container so the history
//! can be found through any of the three ids.

pub mod container;

pub use container::{
    AccessCommand, AccessEvent, AccessKey, BOOKING_TAG, CONTAINER_TAG, CheckOutGuest, ConfirmDoorUnlocked,
    ContainerAccess, ContainerObtained, DoorOpeningRequested, GUEST_TAG, GuestCheckedIn, GuestCheckedOut, Holding,
    ObtainContainer, Occupancy, OpenContainerDoor, Vacated,
};
