//! Background workers.

pub mod projection_worker;

pub use projection_worker::{ProjectionWorker, WorkerError, WorkerHandle, WorkerSettings};
