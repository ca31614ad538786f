//! Bulkfetch Core Library
//!
//! This library provides the engine behind the `bulkfetch` tool, which reads
//! very large numbers of URLs from a directory of flat text files and issues a
//! GET for each one, biasing connection-pool capacity toward the hosts that
//! dominate the workload.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`input`] - File registry, block reader with line-boundary reconstruction, archive extraction
//! - [`queue`] - Bounded work queue between readers and fetch workers
//! - [`fetch`] - Adaptive connection allocator, HTTP fetcher, fetch worker state machine
//! - [`progress`] - Success/failure counters and phase-completion flags
//! - [`pipeline`] - Orchestrator wiring readers, workers and progress reporting
//! - [`report`] - Progress reporter sink (console output)
//! - [`config`] - Validated pipeline configuration

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod fetch;
pub mod input;
pub mod pipeline;
pub mod progress;
pub mod queue;
pub mod report;

// Re-export commonly used types
pub use config::{ConfigError, DEFAULT_IO_TASKS_PER_CORE, PipelineConfig};
pub use fetch::{
    AdaptiveConnectionAllocator, ConnectionLease, FetchError, FetchWorker, Fetcher, HttpFetcher,
    Outcome, PoolConfig, WorkerSummary, classify, route_key,
};
pub use input::{
    ArchiveExtractor, BlockReader, BlockRef, ExtractionError, FileRegistry, GzipExtractor,
    InputError, InputExtractor, RegistryError, ZipExtractor,
};
pub use pipeline::{Pipeline, PipelineError, RunSummary};
pub use progress::{Phase, ProgressReport, ProgressSnapshot};
pub use queue::{Batch, WorkQueue};
pub use report::{ConsoleReporter, ProgressReporter};
