use crate::error::{Result, ScanError};
use crate::pool::{Job, WorkerPool};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Anything usable as an admission key.
pub trait AdmissionKey: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static {}

impl<T> AdmissionKey for T where T: Eq + Hash + Clone + Send + Sync + fmt::Debug + 'static {}

#[derive(Default)]
struct DeferredEntry {
    /// Jobs are `Send` but not `Sync`; the mutex makes the entry `Sync`. It is
    /// only ever reached through the map's exclusive entry guard.
    queue: Mutex<VecDeque<Job>>,
    running: usize,
}

impl DeferredEntry {
    fn queue_mut(&mut self) -> &mut VecDeque<Job> {
        self.queue.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn queued(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

struct Inner<K: AdmissionKey> {
    deferred: DashMap<K, DeferredEntry>,
    pool: WorkerPool,
    bound: usize,
    closed: AtomicBool,
    /// Admitted tasks that have not finished yet, running or deferred.
    outstanding: AtomicUsize,
}

/// Runs tasks on a [`WorkerPool`] while keeping at most `bound` tasks per key
/// in flight.
///
/// Tasks over the bound are parked in a per-key FIFO and promoted one by one
/// as running tasks with the same key finish. Keys never contend with each
/// other: each key's bookkeeping lives in its own map entry and is updated
/// through the entry API. Entries disappear once a key has nothing running
/// and nothing queued.
pub struct KeyedAdmission<K: AdmissionKey> {
    inner: Arc<Inner<K>>,
}

impl<K: AdmissionKey> fmt::Debug for KeyedAdmission<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedAdmission")
            .field("pool", &self.inner.pool)
            .field("bound", &self.inner.bound)
            .field("tracked_keys", &self.inner.deferred.len())
            .field("outstanding", &self.inner.outstanding.load(Ordering::SeqCst))
            .finish()
    }
}

impl<K: AdmissionKey> KeyedAdmission<K> {
    pub fn new(pool: WorkerPool, bound: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                deferred: DashMap::new(),
                pool,
                bound: bound.max(1),
                closed: AtomicBool::new(false),
                outstanding: AtomicUsize::new(0),
            }),
        }
    }

    pub fn bound(&self) -> usize {
        self.inner.bound
    }

    /// Schedules `task` under `key`. Never runs it on the caller.
    ///
    /// Returns [`ScanError::Rejected`] once [`shutdown`](Self::shutdown) has
    /// been called; the task is dropped unrun in that case.
    pub fn submit<F>(&self, task: F, key: K) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let inner = &self.inner;

        inner.outstanding.fetch_add(1, Ordering::SeqCst);
        if inner.closed.load(Ordering::SeqCst) {
            inner.release();
            return Err(ScanError::Rejected);
        }

        let job: Job = Box::pin(task);
        let immediate = {
            let mut entry = inner.deferred.entry(key.clone()).or_default();
            if entry.running < inner.bound {
                entry.running += 1;
                Some(job)
            } else {
                let queue = entry.queue_mut();
                queue.push_back(job);
                debug!(?key, queued = queue.len(), "Deferring task");
                None
            }
        };

        if let Some(job) = immediate {
            // Dropping a rejected job runs its slot guard, which undoes the
            // reservation taken above.
            if !inner.dispatch(job, key) {
                return Err(ScanError::Rejected);
            }
        }
        Ok(())
    }

    /// Stops admitting new tasks. Tasks already admitted, deferred ones
    /// included, still run; the pool shuts down after the last of them.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if inner.outstanding.load(Ordering::SeqCst) == 0 {
            inner.pool.shutdown();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Waits until every admitted task finished and the pool terminated.
    pub async fn terminated(&self) {
        self.inner.pool.terminated().await;
    }

    /// Returns whether termination completed within `timeout`.
    pub async fn await_termination(&self, timeout: Duration) -> bool {
        self.inner.pool.await_termination(timeout).await
    }

    /// Tasks currently running under `key`.
    pub fn running(&self, key: &K) -> usize {
        self.inner.deferred.get(key).map(|e| e.running).unwrap_or(0)
    }

    /// Tasks waiting for a slot under `key`.
    pub fn deferred(&self, key: &K) -> usize {
        self.inner
            .deferred
            .get(key)
            .map(|e| e.queued())
            .unwrap_or(0)
    }

    /// Keys with running or deferred work.
    pub fn tracked_keys(&self) -> usize {
        self.inner.deferred.len()
    }
}

impl<K: AdmissionKey> Inner<K> {
    /// Hands `job` to the pool together with the slot it occupies. Returns
    /// false when the pool refused it.
    fn dispatch(self: &Arc<Self>, job: Job, key: K) -> bool {
        let slot = Slot {
            inner: self.clone(),
            key,
        };
        self.pool
            .submit(Box::pin(async move {
                job.await;
                drop(slot);
            }))
            .map_err(|rejected| {
                warn!("{} pool rejected an admitted task", self.pool.name());
                drop(rejected);
            })
            .is_ok()
    }

    /// Frees the slot held by a finished task, promoting the next deferred
    /// task for the same key if there is one.
    fn finish(self: &Arc<Self>, key: &K) {
        let next = match self.deferred.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if let Some(job) = occupied.get_mut().queue_mut().pop_front() {
                    Some(job)
                } else {
                    occupied.get_mut().running -= 1;
                    if occupied.get().running == 0 {
                        occupied.remove();
                    }
                    None
                }
            }
            Entry::Vacant(_) => None,
        };

        if let Some(job) = next {
            debug!(?key, "Promoting deferred task");
            self.dispatch(job, key.clone());
        }
    }

    fn release(&self) {
        let remaining = self.outstanding.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 && self.closed.load(Ordering::SeqCst) {
            self.pool.shutdown();
        }
    }
}

/// A running task's claim on its key. Released on drop, so a task that
/// panics or is discarded unrun still frees its slot.
struct Slot<K: AdmissionKey> {
    inner: Arc<Inner<K>>,
    key: K,
}

impl<K: AdmissionKey> Drop for Slot<K> {
    fn drop(&mut self) {
        self.inner.finish(&self.key);
        self.inner.release();
    }
}
