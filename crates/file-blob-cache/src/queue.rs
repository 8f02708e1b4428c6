//! Serial job queue backed by a dedicated worker thread
//!
//! Every job submitted to a queue runs on the same thread, one at a time, in
//! submission order. The worker owns the queue state; jobs get exclusive access
//! to it while they run. The worker stops once every sender is dropped.

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::{DiskCacheError, Result};

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

pub(crate) struct SerialQueue<S> {
    tx: mpsc::UnboundedSender<Job<S>>,
}

impl<S: Send + 'static> SerialQueue<S> {
    /// Start a worker thread named `name` that owns `state`
    pub(crate) fn spawn(name: String, mut state: S) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<S>>();

        thread::Builder::new().name(name.clone()).spawn(move || {
            while let Some(job) = rx.blocking_recv() {
                if panic::catch_unwind(AssertUnwindSafe(|| job(&mut state))).is_err() {
                    error!(queue = %name, "Disk queue job panicked");
                }
            }
            debug!(queue = %name, "Disk queue stopped");
        })?;

        Ok(Self { tx })
    }

    /// Enqueue a job without waiting for it
    pub(crate) fn submit<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.tx
            .send(Box::new(job))
            .map_err(|_| DiskCacheError::QueueClosed)
    }

    /// Enqueue a job and return a future resolving to its result
    ///
    /// The job is enqueued immediately, not when the future is first polled.
    pub(crate) fn call<F, R>(&self, job: F) -> impl Future<Output = Result<R>> + Send + 'static
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let submitted = self.submit(move |state| {
            let _ = reply_tx.send(job(state));
        });

        async move {
            submitted?;
            reply_rx.await.map_err(|_| DiskCacheError::QueueClosed)
        }
    }
}
