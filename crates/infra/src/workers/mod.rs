//! Background workers fed by the event bus.

pub mod invalidation_worker;

pub use invalidation_worker::{InvalidationWorker, WorkerHandle};
