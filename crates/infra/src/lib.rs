//! Infrastructure layer: event log, command dispatch, projections and workers.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod ingress;
pub mod projections;
pub mod query;
pub mod read_model;
pub mod retry;
pub mod workers;
