use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tracing::{debug, warn};

/// Unit of work accepted by a [`WorkerPool`].
pub type Job = BoxFuture<'static, ()>;

/// Returned by [`WorkerPool::submit`] after shutdown. Hands the job back so
/// the caller decides what dropping it means.
pub struct Rejected(pub Job);

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rejected(..)")
    }
}

/// Fixed-size pool of tokio workers pulling jobs from a shared queue.
///
/// Jobs are dequeued in submission order but may complete in any order.
/// Submission never blocks and never runs the job on the calling task.
pub struct WorkerPool {
    name: String,
    workers: usize,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    live: watch::Receiver<usize>,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .field("live", &*self.live.borrow())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl WorkerPool {
    /// Spawns `workers` worker tasks (at least one) on the current runtime.
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        let name = name.into();
        let workers = workers.max(1);

        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let queue = Arc::new(AsyncMutex::new(rx));
        let (live_tx, live_rx) = watch::channel(workers);
        let live_tx = Arc::new(live_tx);

        for worker_id in 0..workers {
            let queue = queue.clone();
            let live_tx = live_tx.clone();
            let name = name.clone();

            tokio::spawn(async move {
                debug!("{} worker {} started", name, worker_id);
                loop {
                    let job = { queue.lock().await.recv().await };
                    let Some(job) = job else {
                        break;
                    };
                    if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                        warn!("{} worker {}: job panicked", name, worker_id);
                    }
                }
                live_tx.send_modify(|live| *live -= 1);
                debug!("{} worker {} finished", name, worker_id);
            });
        }

        Self {
            name,
            workers,
            sender: Mutex::new(Some(tx)),
            live: live_rx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queues `job` for execution on one of the workers.
    pub fn submit(&self, job: Job) -> Result<(), Rejected> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(tx) => tx.send(job).map_err(|e| Rejected(e.0)),
            None => Err(Rejected(job)),
        }
    }

    /// Stops accepting jobs. Queued jobs still run. Calling it twice is a no-op.
    pub fn shutdown(&self) {
        let taken = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if taken.is_some() {
            debug!("{} pool shutting down", self.name);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Waits until every worker exited. Only completes after [`shutdown`].
    ///
    /// [`shutdown`]: WorkerPool::shutdown
    pub async fn terminated(&self) {
        let mut live = self.live.clone();
        // A closed channel means every worker is gone as well.
        let _ = live.wait_for(|live| *live == 0).await;
    }

    /// Like [`terminated`](WorkerPool::terminated) but gives up after
    /// `timeout`. Returns whether termination completed.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.terminated()).await.is_ok()
    }
}
