//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus distributes grant-change events from the commands that cause them
//! to the consumers that react to them (cache invalidation, audit feeds).
//!
//! - **Transport-agnostic**: in-memory channels, Redis pub/sub, brokers
//! - **At-least-once**: events may be redelivered; consumers must be idempotent
//! - **No persistence**: the principal/role tables are the source of truth
//!
//! Idempotence comes for free for invalidation: deleting a cache entry twice
//! leaves the same state as deleting it once.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription gets a copy of every event published after it was
/// created (broadcast semantics).
///
/// ```ignore
/// let subscription = bus.subscribe();
///
/// loop {
///     match subscription.recv_timeout(Duration::from_millis(250)) {
///         Ok(event) => invalidate(event),
///         Err(RecvTimeoutError::Timeout) => continue,  // check for shutdown
///         Err(RecvTimeoutError::Disconnected) => break, // bus closed
///     }
/// }
/// ```
///
/// Subscriptions are meant for single-threaded consumption.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

/// Domain-agnostic event bus (pub/sub abstraction).
///
/// ```text
/// Command → write committed → EventBus::publish → Subscribers
///                                                  ├─ invalidation worker
///                                                  └─ other consumers
/// ```
///
/// `publish()` can fail (lock poisoned, network error). Callers that must not
/// fail because of the bus (grant commands) log and swallow the error; the
/// cache TTL bounds the staleness that follows.
///
/// Implementations must be `Send + Sync`; many request tasks publish
/// concurrently.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
