//! Event vocabulary of the tagstream runtime.
//!
//! - [`Event`] / [`EventEnvelope`]: tagged, positioned facts
//! - [`Criteria`] / [`resolve`]: which facts form one entity's history
//! - [`project`]: strict, ordered fold of a history into state
//! - [`Command`] / [`execute`]: intents and the pure decide step
//! - [`EventBus`]: post-commit notification
//! - [`Projection`] / [`ProjectionRunner`]: read-model consumption

pub mod bus;
pub mod command;
pub mod criteria;
pub mod envelope;
pub mod error;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod projection;
pub mod projector;
pub mod runner;

pub use bus::{EventBus, Subscription};
pub use command::{Command, TargetIdentifier};
pub use criteria::{Criteria, resolve};
pub use envelope::EventEnvelope;
pub use error::ProjectionError;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use projection::Projection;
pub use projector::{Projected, decode, decode_all, project, project_state};
pub use runner::{Applied, ProjectionRunner};
