//! Domain events and the pub/sub mechanics that distribute them.
//!
//! Commands that change who holds which grant publish an [`AuthzEvent`]
//! after their own write commits; the invalidation channel subscribes to the
//! bus and clears the affected cache entries.

pub mod authz;
pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use authz::AuthzEvent;
pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
