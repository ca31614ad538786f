//! CLI entry point for bulkfetch.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info, warn};

mod app;
mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    app::terminal::init_tracing(app::terminal::resolve_default_log_level(
        args.verbose,
        args.quiet,
    ));

    debug!(?args, "CLI arguments parsed");
    info!("bulkfetch starting");

    let summary = app::runtime::run_bulkfetch(&args).await?;

    if summary.reader_failures > 0 || summary.worker_failures > 0 {
        warn!(
            reader_failures = summary.reader_failures,
            worker_failures = summary.worker_failures,
            "some tasks failed; counts may be incomplete"
        );
    }

    Ok(())
}
