//! Fetch side of the pipeline.
//!
//! - [`AdaptiveConnectionAllocator`] shares one HTTP client and sizes
//!   per-host connection caps from observed traffic.
//! - [`Fetcher`] is the seam a worker issues requests through;
//!   [`HttpFetcher`] is the real implementation.
//! - [`FetchWorker`] drains the work queue, classifies each result with
//!   [`classify`] and records counts in the shared progress report.

mod allocator;
mod client;
mod error;
mod worker;

pub use allocator::{
    AdaptiveConnectionAllocator, ConnectionLease, PREFERRED_FRACTION, PoolConfig, TOP_HOSTS,
    default_user_agent, route_key,
};
pub use client::{Fetcher, HttpFetcher};
pub use error::{FetchError, Outcome, classify};
pub use worker::{FetchWorker, WorkerSummary};
