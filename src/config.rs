//! Pipeline configuration and validation.
//!
//! [`PipelineConfig`] carries every tunable of a run. Start from
//! [`PipelineConfig::for_parallelism`] and override with the `with_*` methods;
//! [`PipelineConfig::validate`] must pass before the pipeline is built.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: u64 = 10_000;

/// Largest accepted block size (64 MiB). Each read allocates a window this big.
pub const MAX_BLOCK_SIZE: u64 = 64 * 1024 * 1024;

/// Bytes read past a block end to complete its last line.
pub const DEFAULT_LOOKAHEAD: usize = 100;

/// Default work queue capacity, in batches.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Default fetch workers per unit of parallelism.
pub const DEFAULT_IO_TASKS_PER_CORE: usize = 50;

/// Maximum fetch workers per unit of parallelism.
pub const MAX_IO_TASKS_PER_CORE: usize = 500;

/// How long a fetch worker waits on an empty queue before re-checking phases.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between progress lines.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Default HTTP connect timeout (30 seconds).
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes).
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 300;

/// Errors produced by [`PipelineConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Parallelism must be at least one.
    #[error("invalid parallelism {value}: must be at least 1")]
    InvalidParallelism {
        /// The value provided.
        value: usize,
    },

    /// Blocks must be larger than the lookahead window.
    #[error("invalid block size {value}: must be larger than the {lookahead}-byte lookahead")]
    BlockSizeTooSmall {
        /// The value provided.
        value: u64,
        /// The configured lookahead.
        lookahead: usize,
    },

    /// Blocks above [`MAX_BLOCK_SIZE`] are refused.
    #[error("invalid block size {value}: must be at most {max} bytes", max = MAX_BLOCK_SIZE)]
    BlockSizeTooLarge {
        /// The value provided.
        value: u64,
    },

    /// Queue capacity must be at least one.
    #[error("invalid queue capacity {value}: must be at least 1")]
    InvalidQueueCapacity {
        /// The value provided.
        value: usize,
    },

    /// Workers per core out of range.
    #[error("invalid io tasks per core {value}: must be between 1 and {max}", max = MAX_IO_TASKS_PER_CORE)]
    InvalidIoTasksPerCore {
        /// The value provided.
        value: usize,
    },
}

/// Tunables for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Parallelism unit: number of reader tasks.
    pub parallelism: usize,
    /// Fetch workers per unit of parallelism.
    pub io_tasks_per_core: usize,
    /// Block size in bytes.
    pub block_size: u64,
    /// Lookahead window in bytes for completing a block's last line.
    pub lookahead: usize,
    /// Work queue capacity, in batches.
    pub queue_capacity: usize,
    /// Empty-queue poll timeout for fetch workers.
    pub poll_timeout: Duration,
    /// Interval between progress reports.
    pub progress_interval: Duration,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// HTTP read timeout.
    pub read_timeout: Duration,
}

impl PipelineConfig {
    /// Creates a configuration with default values for the given parallelism.
    #[must_use]
    pub fn for_parallelism(parallelism: usize) -> Self {
        Self {
            parallelism,
            io_tasks_per_core: DEFAULT_IO_TASKS_PER_CORE,
            block_size: DEFAULT_BLOCK_SIZE,
            lookahead: DEFAULT_LOOKAHEAD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }

    /// Creates a configuration sized to the host's available parallelism.
    #[must_use]
    pub fn for_host() -> Self {
        Self::for_parallelism(available_parallelism())
    }

    /// Overrides the block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size;
        self
    }

    /// Overrides the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Overrides the number of fetch workers per unit of parallelism.
    #[must_use]
    pub fn with_io_tasks_per_core(mut self, io_tasks_per_core: usize) -> Self {
        self.io_tasks_per_core = io_tasks_per_core;
        self
    }

    /// Overrides the worker poll timeout.
    #[must_use]
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Overrides the progress interval.
    #[must_use]
    pub fn with_progress_interval(mut self, progress_interval: Duration) -> Self {
        self.progress_interval = progress_interval;
        self
    }

    /// Overrides the HTTP timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, connect_timeout: Duration, read_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.read_timeout = read_timeout;
        self
    }

    /// Number of reader tasks.
    #[must_use]
    pub fn reader_tasks(&self) -> usize {
        self.parallelism
    }

    /// Number of fetch workers. Also the total connection budget.
    #[must_use]
    pub fn fetch_workers(&self) -> usize {
        self.parallelism.saturating_mul(self.io_tasks_per_core)
    }

    /// Total outbound connection budget handed to the allocator.
    #[must_use]
    pub fn total_connections(&self) -> usize {
        self.fetch_workers()
    }

    /// Checks every field for a usable value.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallelism == 0 {
            return Err(ConfigError::InvalidParallelism {
                value: self.parallelism,
            });
        }
        if self.block_size <= self.lookahead as u64 {
            return Err(ConfigError::BlockSizeTooSmall {
                value: self.block_size,
                lookahead: self.lookahead,
            });
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::BlockSizeTooLarge {
                value: self.block_size,
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity {
                value: self.queue_capacity,
            });
        }
        if !(1..=MAX_IO_TASKS_PER_CORE).contains(&self.io_tasks_per_core) {
            return Err(ConfigError::InvalidIoTasksPerCore {
                value: self.io_tasks_per_core,
            });
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_host()
    }
}

/// Returns the host's available parallelism, falling back to 1.
#[must_use]
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}
