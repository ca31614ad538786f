//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use bulkfetch_core::config::{
    DEFAULT_BLOCK_SIZE, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IO_TASKS_PER_CORE,
    DEFAULT_QUEUE_CAPACITY, DEFAULT_READ_TIMEOUT_SECS,
};

/// Input used when none is given on the command line.
pub const DEFAULT_INPUT: &str = "inputData.zip";

/// Directory archives are extracted into.
pub const DEFAULT_WORK_DIR: &str = "work_area";

/// Issue a GET for every URL in a directory of text files.
///
/// Bulkfetch reads newline-delimited URLs in fixed-size blocks, fetches them
/// concurrently and prints running success/failure totals. Connection
/// capacity is shifted toward the hosts that dominate the input.
///
/// PARALLELISM comes first: to name an input, give the parallelism too
/// (`bulkfetch 8 ./urls`).
#[derive(Parser, Debug)]
#[command(name = "bulkfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Reader tasks; fetch workers scale with it (default: CPU cores).
    /// Required before INPUT
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    pub parallelism: Option<u16>,

    /// Directory of URL files, or a .zip of .gz parts (or a single .gz) to extract first
    #[arg(default_value = DEFAULT_INPUT)]
    pub input: PathBuf,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Bytes per block read from each file
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub block_size: u64,

    /// Maximum batches waiting between readers and workers
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// Fetch workers per unit of parallelism (1-500)
    #[arg(long, default_value_t = DEFAULT_IO_TASKS_PER_CORE as u16, value_parser = clap::value_parser!(u16).range(1..=500))]
    pub io_tasks_per_core: u16,

    /// HTTP connect timeout in seconds
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub connect_timeout: u64,

    /// HTTP read timeout in seconds
    #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..))]
    pub read_timeout: u64,

    /// Directory archives are extracted into
    #[arg(long, default_value = DEFAULT_WORK_DIR)]
    pub work_dir: PathBuf,

    /// Print the final summary as JSON
    #[arg(long)]
    pub json: bool,
}
