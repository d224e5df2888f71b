//! Infrastructure layer: configuration and process wiring, Redis adapters,
//! the in-memory directory, grant commands and the invalidation worker.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod directory;
pub mod event_bus;
pub mod grants;
pub mod workers;


pub use bootstrap::{Gatehouse, build, start_from_env};
pub use config::{ConfigError, GatehouseConfig};
pub use directory::InMemoryDirectory;
pub use event_bus::AuthzBus;
pub use grants::{GrantError, GrantService};
pub use workers::{InvalidationWorker, WorkerHandle};
