use tracing::{debug, warn};

use gatehouse_events::{AuthzEvent, EventBus, EventEnvelope};

/// Publishes grant-change events without ever failing the caller.
///
/// A lost event leaves stale cache entries until their TTL runs out.
#[derive(Debug, Clone)]
pub struct AuthzEventPublisher<B> {
    bus: B,
}

impl<B> AuthzEventPublisher<B>
where
    B: EventBus<EventEnvelope<AuthzEvent>>,
{
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Returns whether the bus accepted the event.
    pub fn publish(&self, event: AuthzEvent) -> bool {
        let envelope = EventEnvelope::wrap(event);
        let event_id = envelope.event_id();
        let event_type = envelope.event_type().to_string();

        match self.bus.publish(envelope) {
            Ok(()) => {
                debug!(%event_id, %event_type, "published authz event");
                true
            }
            Err(err) => {
                warn!(%event_id, %event_type, error = ?err, "failed to publish authz event");
                false
            }
        }
    }
}
