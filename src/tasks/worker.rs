//! Serial Worker
//!
//! A single queue per cache instance that runs disk jobs one at a time in
//! enqueue order. Jobs execute on Tokio's blocking pool so filesystem calls
//! never stall the async executor.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

// == Serial Worker ==
/// Handle to the background task draining the job queue.
///
/// The task exits once every handle is dropped and the queue is drained.
#[derive(Debug)]
pub struct SerialWorker {
    name: String,
    jobs: mpsc::UnboundedSender<Job>,
}

impl SerialWorker {
    /// Spawns the worker task on `runtime`.
    pub fn spawn(runtime: &Handle, name: impl Into<String>) -> Self {
        let name = name.into();
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();

        let task_name = name.clone();
        let blocking = runtime.clone();
        runtime.spawn(async move {
            debug!("Serial worker for {} started", task_name);
            while let Some(job) = queue.recv().await {
                // Awaiting each job before taking the next keeps them ordered
                if let Err(e) = blocking.spawn_blocking(job).await {
                    error!("Serial worker job for {} failed: {}", task_name, e);
                }
            }
            debug!("Serial worker for {} stopped", task_name);
        });

        Self { name, jobs }
    }

    // == Submit ==
    /// Enqueues `job` behind every previously submitted job.
    ///
    /// The returned [`Completion`] resolves with the job's result, or with
    /// `T::default()` if the worker is gone or the job panicked.
    pub fn submit<T, F>(&self, job: F) -> Completion<T>
    where
        T: Default + Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let boxed: Job = Box::new(move || {
            // Receiver may have been dropped by a fire-and-forget caller
            let _ = tx.send(job());
        });

        if self.jobs.send(boxed).is_err() {
            warn!("Serial worker for {} is gone; job dropped", self.name);
        }
        Completion { rx }
    }
}

// == Completion ==
/// Result of a queued cache operation.
///
/// Await it to observe the outcome, or drop it: the operation runs either way.
#[derive(Debug)]
#[must_use = "dropping a Completion is fine, but the result is only observable by awaiting it"]
pub struct Completion<T> {
    rx: oneshot::Receiver<T>,
}

impl<T: Default> Completion<T> {
    /// A completion that is already resolved.
    pub fn ready(value: T) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(value);
        Self { rx }
    }

    /// Blocks the current thread until the operation finishes.
    ///
    /// For callers outside an async context. Panics if called from within an
    /// async execution context, like any blocking receive.
    pub fn blocking_wait(self) -> T {
        self.rx.blocking_recv().unwrap_or_default()
    }
}

impl<T: Default> Future for Completion<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or_default())
    }
}
