use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::bail;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use gatehouse_auth::{KeyValueStore, PermissionInvalidator, PrincipalStore, RoleStore};
use gatehouse_events::{AuthzEvent, Event, EventBus, EventEnvelope, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Drives a [`PermissionInvalidator`] from a bus subscription.
///
/// - Runs on a dedicated named thread
/// - Invalidation futures run on the given tokio runtime
/// - Failures are logged; delivery is at-least-once and deletes are idempotent
#[derive(Debug)]
pub struct InvalidationWorker;

impl InvalidationWorker {
    /// Subscribe to `bus` and start the worker thread.
    ///
    /// The subscription is taken before this returns, so events published
    /// afterwards are never missed.
    pub fn spawn<B, S, P>(
        name: &'static str,
        bus: B,
        invalidator: Arc<PermissionInvalidator<S, P>>,
        runtime: Handle,
    ) -> io::Result<WorkerHandle>
    where
        B: EventBus<EventEnvelope<AuthzEvent>> + 'static,
        S: KeyValueStore + Clone + 'static,
        P: PrincipalStore + RoleStore + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub = bus.subscribe();

        let mut handler = move |envelope: EventEnvelope<AuthzEvent>| -> anyhow::Result<()> {
            let event = envelope.payload();
            if envelope.event_version() != event.version() {
                bail!(
                    "unsupported {} version {} (event {})",
                    envelope.event_type(),
                    envelope.event_version(),
                    envelope.event_id()
                );
            }
            debug!(event_id = %envelope.event_id(), event_type = envelope.event_type(), "invalidating");
            runtime.block_on(invalidator.handle(event));
            Ok(())
        };

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, &mut handler))?;

        info!(worker = name, "invalidation worker started");
        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    handler: &mut H,
) where
    H: FnMut(M) -> anyhow::Result<()>,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = %err, "invalidation worker handler failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    info!(worker = name, "invalidation worker stopped");
}
