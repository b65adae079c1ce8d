use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;
use tracing::warn;

/// One-shot countdown for a single crawl level.
///
/// Armed with the number of parties expected to arrive: one per frontier
/// address plus the driver. Work items hold an [`Arrival`] and arrive by
/// dropping it. Only one task may wait on a barrier.
#[derive(Debug)]
pub struct LevelBarrier {
    pending: AtomicUsize,
    settled: Notify,
}

impl LevelBarrier {
    pub fn arm(parties: usize) -> Arc<Self> {
        Arc::new(Self {
            pending: AtomicUsize::new(parties),
            settled: Notify::new(),
        })
    }

    /// Parties that have not arrived yet.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    fn arrive(&self) {
        match self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(1) => self.settled.notify_one(),
            Ok(_) => {}
            Err(_) => warn!("Arrival on a barrier that already settled"),
        }
    }

    /// Waits until every party has arrived.
    pub async fn wait(&self) {
        while self.pending() > 0 {
            self.settled.notified().await;
        }
    }

    /// Arrives for the caller, then waits for everyone else.
    pub async fn arrive_and_wait(&self) {
        self.arrive();
        self.wait().await;
    }
}

/// A single party's pending arrival. Dropping it arrives.
///
/// Moving the token hands the obligation to arrive over to the new owner, so
/// an item that passes through several stages still arrives exactly once.
#[derive(Debug)]
#[must_use = "dropping an Arrival arrives immediately"]
pub struct Arrival {
    barrier: Arc<LevelBarrier>,
}

impl Arrival {
    pub fn new(barrier: &Arc<LevelBarrier>) -> Self {
        Self {
            barrier: barrier.clone(),
        }
    }
}

impl Drop for Arrival {
    fn drop(&mut self) {
        self.barrier.arrive();
    }
}
