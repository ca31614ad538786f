//! Bounded work queue between reader tasks and fetch workers.
//!
//! [`WorkQueue`] is a FIFO of line batches with a fixed capacity. Producers
//! wait (never fail) while it is full; consumers wait up to a timeout while it
//! is empty. Capacity and availability are both tracked with Tokio semaphores,
//! so waiting is fair and cancellation-safe.
//!
//! A batch stays visible to [`WorkQueue::is_empty`] until the consumer that
//! claimed it has removed it, which lets fetch workers use
//! `ingestion complete && queue empty` as their exit condition.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::trace;

/// The lines reconstructed from one block.
pub type Batch = Vec<String>;

/// Bounded multi-producer, multi-consumer batch queue.
#[derive(Debug)]
pub struct WorkQueue {
    items: Mutex<VecDeque<Batch>>,
    /// Free slots; producers take one per push.
    slots: Semaphore,
    /// Queued batches; consumers take one per pop.
    available: Semaphore,
    capacity: usize,
}

impl WorkQueue {
    /// Creates a queue holding at most `capacity` batches.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            slots: Semaphore::new(capacity),
            available: Semaphore::new(0),
            capacity,
        }
    }

    /// Maximum number of queued batches.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of queued batches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no batch is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Appends a batch, waiting for a free slot while the queue is full.
    pub async fn push(&self, batch: Batch) {
        // The semaphores are never closed, so acquire cannot fail.
        if let Ok(permit) = self.slots.acquire().await {
            permit.forget();
        }
        self.lock().push_back(batch);
        self.available.add_permits(1);
        trace!("batch enqueued");
    }

    /// Removes the oldest batch, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` if the timeout elapsed with the queue still empty.
    pub async fn pop(&self, timeout: Duration) -> Option<Batch> {
        let permit = tokio::time::timeout(timeout, self.available.acquire())
            .await
            .ok()?
            .ok()?;
        permit.forget();
        let batch = self.lock().pop_front();
        self.slots.add_permits(1);
        batch
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Batch>> {
        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
