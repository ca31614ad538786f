use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bulkfetch_core::config::available_parallelism;
use bulkfetch_core::{
    AdaptiveConnectionAllocator, ConsoleReporter, FileRegistry, HttpFetcher, InputExtractor,
    Pipeline, PipelineConfig, ProgressReporter, RunSummary,
};
use tracing::{debug, info};

use crate::app::input;
use crate::cli::Args;

pub(crate) fn pipeline_config(args: &Args) -> PipelineConfig {
    let parallelism = args
        .parallelism
        .map_or_else(available_parallelism, usize::from);
    PipelineConfig::for_parallelism(parallelism)
        .with_block_size(args.block_size)
        .with_queue_capacity(args.queue_capacity)
        .with_io_tasks_per_core(usize::from(args.io_tasks_per_core))
        .with_timeouts(
            Duration::from_secs(args.connect_timeout),
            Duration::from_secs(args.read_timeout),
        )
}

pub(crate) async fn run_bulkfetch(args: &Args) -> Result<RunSummary> {
    let config = pipeline_config(args);
    config.validate()?;
    debug!(?config, "pipeline configuration");

    let extractor = Arc::new(InputExtractor::new(&args.work_dir));
    let input_dir = input::resolve_input_dir(&args.input, extractor).await?;
    let registry = Arc::new(FileRegistry::scan(&input_dir)?);
    info!(dir = %input_dir.display(), files = registry.len(), "input ready");

    let allocator = Arc::new(AdaptiveConnectionAllocator::new(
        config.total_connections(),
        config.connect_timeout,
        config.read_timeout,
    )?);
    let fetcher = Arc::new(HttpFetcher::new(Arc::clone(&allocator)));
    let reporter: Arc<dyn ProgressReporter> = if args.json {
        Arc::new(ConsoleReporter::json())
    } else {
        Arc::new(ConsoleReporter::new())
    };

    let pipeline = Pipeline::new(config, registry, allocator, fetcher, reporter)?;
    Ok(pipeline.run().await)
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_pipeline_config_from_args() {
        let args = Args::try_parse_from([
            "bulkfetch",
            "4",
            "--io-tasks-per-core",
            "10",
            "--block-size",
            "2048",
            "--read-timeout",
            "12",
        ])
        .unwrap();
        let config = pipeline_config(&args);

        assert_eq!(config.parallelism, 4);
        assert_eq!(config.fetch_workers(), 40);
        assert_eq!(config.total_connections(), 40);
        assert_eq!(config.block_size, 2048);
        assert_eq!(config.read_timeout, Duration::from_secs(12));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pipeline_config_defaults_to_host_parallelism() {
        let args = Args::try_parse_from(["bulkfetch"]).unwrap();
        assert_eq!(pipeline_config(&args).parallelism, available_parallelism());
    }

    #[tokio::test]
    async fn test_oversized_block_size_fails_before_reading_input() {
        let args = Args::try_parse_from([
            "bulkfetch",
            "1",
            "does-not-exist",
            "--block-size",
            "18446744073709551615",
        ])
        .unwrap();

        let err = run_bulkfetch(&args).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<bulkfetch_core::ConfigError>(),
            Some(bulkfetch_core::ConfigError::BlockSizeTooLarge { .. })
        ));
    }

    #[test]
    fn test_block_size_not_above_lookahead_is_rejected() {
        let args = Args::try_parse_from(["bulkfetch", "--block-size", "50"]).unwrap();
        assert!(pipeline_config(&args).validate().is_err());
    }
}
