//! The orchestrator that wires readers, the queue and fetch workers together.
//!
//! A run has two phases. During ingestion, `parallelism` reader tasks pull
//! block assignments from the [`FileRegistry`], reconstruct the lines of each
//! block on the blocking pool and push them onto the [`WorkQueue`]. During
//! fetch, `parallelism × io_tasks_per_core` [`FetchWorker`]s drain the queue.
//! The phases overlap: workers start immediately and only exit once ingestion
//! is marked complete and the queue is empty.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use bulkfetch_core::{
//!     AdaptiveConnectionAllocator, ConsoleReporter, FileRegistry, HttpFetcher, Pipeline,
//!     PipelineConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::for_parallelism(4);
//! let registry = Arc::new(FileRegistry::scan(Path::new("./work_area"))?);
//! let allocator = Arc::new(AdaptiveConnectionAllocator::new(
//!     config.total_connections(),
//!     config.connect_timeout,
//!     config.read_timeout,
//! )?);
//! let fetcher = Arc::new(HttpFetcher::new(Arc::clone(&allocator)));
//! let pipeline = Pipeline::new(config, registry, allocator, fetcher, Arc::new(ConsoleReporter::new()))?;
//! let summary = pipeline.run().await;
//! println!("{} succeeded, {} failed", summary.success, summary.failure);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::fetch::{AdaptiveConnectionAllocator, FetchWorker, Fetcher, WorkerSummary};
use crate::input::{BlockReader, FileRegistry, RegistryError};
use crate::progress::{Phase, ProgressReport};
use crate::queue::WorkQueue;
use crate::report::ProgressReporter;

/// Failures of spawned pipeline tasks. Logged and counted, never fatal.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A task panicked or was cancelled.
    #[error("{role} task {index} did not finish: {source}")]
    Task {
        /// `"reader"`, `"worker"` or `"block read"`.
        role: &'static str,
        /// Task index within its role.
        index: usize,
        /// The join failure.
        #[source]
        source: JoinError,
    },
}

impl PipelineError {
    /// Creates a task failure error.
    pub fn task(role: &'static str, index: usize, source: JoinError) -> Self {
        Self::Task {
            role,
            index,
            source,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// URLs that resolved with a status below 400.
    pub success: u64,
    /// URLs that resolved with a status of 400 or above.
    pub failure: u64,
    /// Wall time from start to the last worker exiting.
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Block reads that failed plus reader tasks that did not finish.
    pub reader_failures: usize,
    /// Fetch workers that did not finish.
    pub worker_failures: usize,
    /// Tallies summed over every worker that finished.
    pub workers: WorkerSummary,
}

impl RunSummary {
    /// Returns `success + failure`.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// What one reader task got through.
#[derive(Debug, Default, Clone, Copy)]
struct ReaderSummary {
    blocks: u64,
    lines: u64,
    errors: usize,
}

/// Runs one bulk fetch over the files in a registry.
pub struct Pipeline {
    config: PipelineConfig,
    registry: Arc<FileRegistry>,
    allocator: Arc<AdaptiveConnectionAllocator>,
    fetcher: Arc<dyn Fetcher>,
    reporter: Arc<dyn ProgressReporter>,
    progress: Arc<ProgressReport>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("files", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Creates a pipeline after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid.
    pub fn new(
        config: PipelineConfig,
        registry: Arc<FileRegistry>,
        allocator: Arc<AdaptiveConnectionAllocator>,
        fetcher: Arc<dyn Fetcher>,
        reporter: Arc<dyn ProgressReporter>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            allocator,
            fetcher,
            reporter,
            progress: Arc::new(ProgressReport::new()),
        })
    }

    /// Shared progress, observable while [`run`](Self::run) is in flight.
    #[must_use]
    pub fn progress(&self) -> Arc<ProgressReport> {
        Arc::clone(&self.progress)
    }

    /// Runs both phases to completion.
    #[instrument(skip(self), fields(files = self.registry.len()))]
    pub async fn run(self) -> RunSummary {
        let started = Instant::now();
        let config = &self.config;
        info!(
            readers = config.reader_tasks(),
            workers = config.fetch_workers(),
            block_size = config.block_size,
            queue_capacity = config.queue_capacity,
            "starting pipeline"
        );

        let queue = Arc::new(WorkQueue::new(config.queue_capacity));
        let reader = Arc::new(BlockReader::with_block_size(
            Arc::clone(&self.registry),
            config.block_size,
            config.lookahead,
        ));
        let fetch_done = Arc::new(Notify::new());

        let printer = spawn_progress_printer(
            Arc::clone(&self.progress),
            Arc::clone(&self.reporter),
            Arc::clone(&fetch_done),
            config.progress_interval,
        );

        let readers: Vec<JoinHandle<ReaderSummary>> = (0..config.reader_tasks())
            .map(|index| {
                tokio::spawn(read_blocks(
                    index,
                    Arc::clone(&self.registry),
                    Arc::clone(&reader),
                    Arc::clone(&queue),
                ))
            })
            .collect();

        let workers: Vec<JoinHandle<WorkerSummary>> = (0..config.fetch_workers())
            .map(|index| {
                let worker = FetchWorker::new(
                    index,
                    Arc::clone(&queue),
                    Arc::clone(&self.progress),
                    Arc::clone(&self.allocator),
                    Arc::clone(&self.fetcher),
                    config.poll_timeout,
                );
                tokio::spawn(worker.run())
            })
            .collect();

        let mut reader_failures = 0;
        let mut lines = 0;
        for (index, handle) in readers.into_iter().enumerate() {
            match handle.await {
                Ok(summary) => {
                    reader_failures += summary.errors;
                    lines += summary.lines;
                }
                Err(e) => {
                    warn!(error = %PipelineError::task("reader", index, e), "reader task failed");
                    reader_failures += 1;
                }
            }
        }
        self.progress.mark_phase_complete(Phase::Ingestion);
        info!(
            lines,
            lookahead_reads = reader.lookahead_reads(),
            "ingestion complete"
        );
        self.reporter.ingestion_complete();

        let mut worker_failures = 0;
        let mut totals = WorkerSummary::default();
        for (index, handle) in workers.into_iter().enumerate() {
            match handle.await {
                Ok(summary) => totals.merge(&summary),
                Err(e) => {
                    warn!(error = %PipelineError::task("worker", index, e), "fetch worker failed");
                    worker_failures += 1;
                }
            }
        }
        self.progress.mark_phase_complete(Phase::Fetch);
        fetch_done.notify_one();

        if let Err(e) = printer.await {
            warn!(error = %e, "progress task failed");
        }

        let snapshot = self.progress.snapshot();
        let summary = RunSummary {
            success: snapshot.success,
            failure: snapshot.failure,
            elapsed: started.elapsed(),
            reader_failures,
            worker_failures,
            workers: totals,
        };
        info!(
            success = summary.success,
            failure = summary.failure,
            retries = totals.retries,
            skipped = totals.skipped,
            elapsed_secs = summary.elapsed.as_secs(),
            "pipeline finished"
        );
        self.reporter.finished(&summary);
        summary
    }
}

/// Reports progress every `interval` until the fetch phase is complete.
fn spawn_progress_printer(
    progress: Arc<ProgressReport>,
    reporter: Arc<dyn ProgressReporter>,
    fetch_done: Arc<Notify>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while !progress.is_phase_complete(Phase::Fetch) {
            reporter.progress(progress.snapshot());
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = fetch_done.notified() => {}
            }
        }
    })
}

/// Reader task: allocate, read, enqueue until every file is exhausted.
///
/// A failed read retires the file it came from and the task moves on.
#[instrument(skip(registry, reader, queue))]
async fn read_blocks(
    index: usize,
    registry: Arc<FileRegistry>,
    reader: Arc<BlockReader>,
    queue: Arc<WorkQueue>,
) -> ReaderSummary {
    let mut summary = ReaderSummary::default();

    loop {
        let block = match registry.allocate_block() {
            Ok(block) => block,
            Err(RegistryError::Exhausted) => break,
        };
        let path = block.path.clone();

        let read = {
            let reader = Arc::clone(&reader);
            tokio::task::spawn_blocking(move || reader.read_block(&block)).await
        };

        match read {
            Ok(Ok(Some(lines))) => {
                summary.blocks += 1;
                if lines.is_empty() {
                    continue;
                }
                summary.lines += lines.len() as u64;
                queue.push(lines).await;
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "block read failed; retiring file");
                registry.complete(&path);
                summary.errors += 1;
            }
            Err(e) => {
                warn!(
                    error = %PipelineError::task("block read", index, e),
                    path = %path.display(),
                    "block read did not finish; retiring file"
                );
                registry.complete(&path);
                summary.errors += 1;
            }
        }
    }

    debug!(blocks = summary.blocks, lines = summary.lines, "reader finished");
    summary
}
