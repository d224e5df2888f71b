//! Best-effort, non-blocking dispatch of housekeeping work.
//!
//! Cache population and invalidation triggered from a request or command
//! must never block or fail that request. Work handed to [`BackgroundTasks`]
//! runs later on a single drain task, in submission order. When the bounded
//! queue is full the work is dropped with a warning; the cache TTL bounds
//! what that costs.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Job {
    label: &'static str,
    task: BoxedTask,
}

/// Handle to the background queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct BackgroundTasks {
    tx: mpsc::Sender<Job>,
}

impl BackgroundTasks {
    /// Start the drain task on the current tokio runtime.
    ///
    /// The returned join handle completes once every `BackgroundTasks` clone
    /// has been dropped and the queue is empty.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));

        let join = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                debug!(task = job.label, "running background task");
                job.task.await;
            }
        });

        (Self { tx }, join)
    }

    /// Queue `task` without waiting. Returns `false` if it was dropped.
    pub fn dispatch<F>(&self, label: &'static str, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let job = Job {
            label,
            task: Box::pin(task),
        };

        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(task = job.label, "background queue full; dropping task");
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!(task = job.label, "background queue closed; dropping task");
                false
            }
        }
    }

    /// Queue a fallible task; its error is logged, never returned.
    pub fn dispatch_fallible<F, E>(&self, label: &'static str, task: F) -> bool
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        self.dispatch(label, async move {
            if let Err(err) = task.await {
                warn!(task = label, error = %err, "background task failed");
            }
        })
    }

    /// Wait until everything queued before this call has run.
    pub async fn flush(&self) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        let marker = Job {
            label: "flush",
            task: Box::pin(async move {
                let _ = done_tx.send(());
            }),
        };

        if self.tx.send(marker).await.is_err() {
            return false;
        }
        done_rx.await.is_ok()
    }
}
