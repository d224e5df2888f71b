//! Infrastructure event bus implementations.
//!
//! The bus abstraction lives in `gatehouse-events` as pure mechanics; this
//! module adds transports that cross process boundaries and [`AuthzBus`],
//! which picks one at startup.

use std::sync::Arc;

use thiserror::Error;

use gatehouse_events::{AuthzEvent, EventBus, EventEnvelope, InMemoryBusError, InMemoryEventBus, Subscription};

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubEventBus};

type Envelope = EventEnvelope<AuthzEvent>;

#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    InMemory(#[from] InMemoryBusError),

    #[cfg(feature = "redis")]
    #[error(transparent)]
    Redis(#[from] RedisBusError),
}

/// The authz event transport selected by configuration.
#[derive(Debug, Clone)]
pub enum AuthzBus {
    /// Single process: events never leave this instance.
    InMemory(Arc<InMemoryEventBus<Envelope>>),

    /// Every instance subscribed to the channel sees every event.
    #[cfg(feature = "redis")]
    Redis(RedisPubSubEventBus),
}

impl AuthzBus {
    pub fn in_memory() -> Self {
        Self::InMemory(Arc::new(InMemoryEventBus::new()))
    }
}

impl EventBus<Envelope> for AuthzBus {
    type Error = BusError;

    fn publish(&self, message: Envelope) -> Result<(), Self::Error> {
        match self {
            AuthzBus::InMemory(bus) => Ok(bus.publish(message)?),
            #[cfg(feature = "redis")]
            AuthzBus::Redis(bus) => Ok(bus.publish(message)?),
        }
    }

    fn subscribe(&self) -> Subscription<Envelope> {
        match self {
            AuthzBus::InMemory(bus) => bus.subscribe(),
            #[cfg(feature = "redis")]
            AuthzBus::Redis(bus) => bus.subscribe(),
        }
    }
}
