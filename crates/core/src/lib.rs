//! `tagstream-core`: pure building blocks for tag-correlated event sourcing.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod lifecycle;
pub mod state;
pub mod tag;

pub use error::{DomainError, DomainResult};
pub use id::{EventId, Position};
pub use lifecycle::Lifecycle;
pub use state::EventSourcedState;
pub use tag::{Tag, TagSet};
