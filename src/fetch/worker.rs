//! Fetch workers: drain the queue and resolve every URL in each batch.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use super::allocator::AdaptiveConnectionAllocator;
use super::client::Fetcher;
use super::error::{Outcome, classify};
use crate::progress::{Phase, ProgressReport};
use crate::queue::{Batch, WorkQueue};

/// Where a worker is in its loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerState {
    WaitingForWork,
    Tuning(Batch),
    Dispatching(Batch),
    Retrying(Vec<String>),
    Done,
}

/// Per-worker tallies returned when the worker exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    /// Batches taken from the queue.
    pub batches: u64,
    /// URLs counted as success or failure.
    pub resolved: u64,
    /// URL attempts that were re-dispatched after a transient failure.
    pub retries: u64,
    /// Malformed URLs dropped without being counted.
    pub skipped: u64,
}

impl WorkerSummary {
    /// Adds another worker's tallies to this one.
    pub fn merge(&mut self, other: &Self) {
        self.batches += other.batches;
        self.resolved += other.resolved;
        self.retries += other.retries;
        self.skipped += other.skipped;
    }
}

#[derive(Debug, Default)]
struct Sweep {
    success: u64,
    failure: u64,
    skipped: u64,
    retry: Vec<String>,
}

/// Consumes batches until ingestion is complete and the queue is empty.
///
/// A URL is counted exactly once, by the attempt that resolves it. Transport
/// failures are retried without limit or backoff.
pub struct FetchWorker {
    id: usize,
    queue: Arc<WorkQueue>,
    progress: Arc<ProgressReport>,
    allocator: Arc<AdaptiveConnectionAllocator>,
    fetcher: Arc<dyn Fetcher>,
    poll_timeout: Duration,
}

impl std::fmt::Debug for FetchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchWorker")
            .field("id", &self.id)
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

impl FetchWorker {
    /// Creates a worker.
    #[must_use]
    pub fn new(
        id: usize,
        queue: Arc<WorkQueue>,
        progress: Arc<ProgressReport>,
        allocator: Arc<AdaptiveConnectionAllocator>,
        fetcher: Arc<dyn Fetcher>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            progress,
            allocator,
            fetcher,
            poll_timeout,
        }
    }

    /// Runs the worker to completion.
    #[instrument(skip(self), fields(worker = self.id))]
    pub async fn run(self) -> WorkerSummary {
        let mut summary = WorkerSummary::default();
        let mut state = WorkerState::WaitingForWork;

        loop {
            state = match state {
                WorkerState::WaitingForWork => match self.queue.pop(self.poll_timeout).await {
                    Some(batch) => {
                        summary.batches += 1;
                        WorkerState::Tuning(batch)
                    }
                    None if self.may_exit() => WorkerState::Done,
                    None => WorkerState::WaitingForWork,
                },
                WorkerState::Tuning(batch) => {
                    self.allocator.retune(&batch);
                    WorkerState::Dispatching(batch)
                }
                WorkerState::Dispatching(batch) => self.sweep(batch, &mut summary).await,
                WorkerState::Retrying(urls) => {
                    summary.retries += urls.len() as u64;
                    debug!(count = urls.len(), "retrying transient failures");
                    self.sweep(urls, &mut summary).await
                }
                WorkerState::Done => break,
            };
        }

        debug!(?summary, "worker finished");
        summary
    }

    /// Exit only when ingestion is over and nothing is left to claim.
    fn may_exit(&self) -> bool {
        self.progress.is_phase_complete(Phase::Ingestion) && self.queue.is_empty()
    }

    /// Issues one request per URL concurrently and records the outcomes.
    async fn sweep(&self, urls: Vec<String>, summary: &mut WorkerSummary) -> WorkerState {
        let results = join_all(urls.iter().map(|url| self.fetcher.fetch(url))).await;

        let mut sweep = Sweep::default();
        for (url, result) in urls.into_iter().zip(results) {
            match classify(&result) {
                Outcome::Success => sweep.success += 1,
                Outcome::Permanent => {
                    trace!(url = %url, ?result, "permanent failure");
                    sweep.failure += 1;
                }
                Outcome::Transient => {
                    if let Err(e) = &result {
                        trace!(url = %url, error = %e, "transient failure");
                    }
                    sweep.retry.push(url);
                }
                Outcome::Skipped => {
                    warn!(url = %url, "skipping malformed URL");
                    sweep.skipped += 1;
                }
            }
        }

        self.progress.add(sweep.success, sweep.failure);
        summary.resolved += sweep.success + sweep.failure;
        summary.skipped += sweep.skipped;

        if sweep.retry.is_empty() {
            WorkerState::WaitingForWork
        } else {
            WorkerState::Retrying(sweep.retry)
        }
    }
}
