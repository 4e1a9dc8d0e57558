//! Bounded pool for background pipeline runs.
//!
//! Submitting never waits: the task is spawned at once and parks on a
//! semaphore until one of `capacity` slots frees up.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

const DEFAULT_CAPACITY: usize = 16;

/// Handle of a submitted run.
pub type RunHandle<T> = JoinHandle<T>;

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub active: usize,
    pub queued: usize,
}

#[derive(Debug, Clone)]
pub struct WorkerPool {
    capacity: usize,
    slots: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// Decrements a counter when dropped, so panicking runs are still counted out.
struct CountGuard(Arc<AtomicUsize>);

impl CountGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for CountGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WorkerPool {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            active: Arc::new(AtomicUsize::new(0)),
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn submit<F>(&self, run: F) -> RunHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let slots = self.slots.clone();
        let active = self.active.clone();
        let queued = CountGuard::enter(&self.queued);

        tokio::spawn(async move {
            // the semaphore is never closed
            let _permit = slots.acquire_owned().await.ok();
            drop(queued);
            let _active = CountGuard::enter(&active);
            run.await
        })
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            active: self.active.load(Ordering::SeqCst),
            queued: self.queued.load(Ordering::SeqCst),
        }
    }
}
