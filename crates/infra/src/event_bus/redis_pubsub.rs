//! Redis pub/sub-backed event bus (optional).
//!
//! Pub/sub is not durable: an instance that is offline misses events and
//! relies on the cache TTL instead. Every instance subscribes so that its
//! local invalidation worker sees grant changes made anywhere.

use std::sync::mpsc;
use std::thread;

use redis::Commands;
use thiserror::Error;
use tracing::{debug, warn};

use gatehouse_events::{AuthzEvent, EventBus, EventEnvelope, Subscription};

#[derive(Debug, Error)]
pub enum RedisBusError {
    #[error("redis error: {0}")]
    Redis(String),

    #[error("serialization error: {0}")]
    Serialize(String),
}

/// Redis pub/sub bus for JSON-encoded authz event envelopes.
#[derive(Debug, Clone)]
pub struct RedisPubSubEventBus {
    client: redis::Client,
    channel: String,
}

impl RedisPubSubEventBus {
    pub fn new(redis_url: impl AsRef<str>, channel: impl Into<String>) -> Result<Self, RedisBusError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;
        Ok(Self {
            client,
            channel: channel.into(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl EventBus<EventEnvelope<AuthzEvent>> for RedisPubSubEventBus {
    type Error = RedisBusError;

    fn publish(&self, message: EventEnvelope<AuthzEvent>) -> Result<(), Self::Error> {
        let payload = serde_json::to_string(&message)
            .map_err(|e| RedisBusError::Serialize(e.to_string()))?;

        let mut conn = self
            .client
            .get_connection()
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        let receivers: i64 = conn
            .publish(&self.channel, payload)
            .map_err(|e| RedisBusError::Redis(e.to_string()))?;

        debug!(channel = %self.channel, receivers, "published to redis");
        Ok(())
    }

    fn subscribe(&self) -> Subscription<EventEnvelope<AuthzEvent>> {
        let (tx, rx) = mpsc::channel();

        let client = self.client.clone();
        let channel = self.channel.clone();

        // Forwarding thread; exits when the subscription is dropped or the
        // connection fails, which disconnects the receiver.
        let spawned = thread::Builder::new()
            .name("authz-redis-pubsub".to_string())
            .spawn(move || {
                let mut conn = match client.get_connection() {
                    Ok(c) => c,
                    Err(err) => {
                        warn!(error = %err, "redis pub/sub connection failed");
                        return;
                    }
                };

                let mut pubsub = conn.as_pubsub();
                if let Err(err) = pubsub.subscribe(&channel) {
                    warn!(error = %err, %channel, "redis subscribe failed");
                    return;
                }

                loop {
                    let msg = match pubsub.get_message() {
                        Ok(m) => m,
                        Err(err) => {
                            warn!(error = %err, %channel, "redis pub/sub connection lost");
                            return;
                        }
                    };

                    let payload: String = match msg.get_payload() {
                        Ok(p) => p,
                        Err(_) => continue,
                    };

                    let envelope: EventEnvelope<AuthzEvent> = match serde_json::from_str(&payload) {
                        Ok(e) => e,
                        Err(err) => {
                            warn!(error = %err, "skipping undecodable authz event");
                            continue;
                        }
                    };

                    if tx.send(envelope).is_err() {
                        return;
                    }
                }
            });

        if let Err(err) = spawned {
            warn!(error = %err, "failed to start redis pub/sub thread");
        }

        Subscription::new(rx)
    }
}
