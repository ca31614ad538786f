//! Integration tests for the full pipeline against a mock HTTP server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bulkfetch_core::{
    AdaptiveConnectionAllocator, FileRegistry, HttpFetcher, Phase, Pipeline, PipelineConfig,
    ProgressReporter, ProgressSnapshot, RunSummary,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Reporter that only counts calls.
#[derive(Default)]
struct CountingReporter {
    progress: AtomicUsize,
    ingested: AtomicUsize,
    finished: AtomicUsize,
}

impl ProgressReporter for CountingReporter {
    fn progress(&self, _snapshot: ProgressSnapshot) {
        self.progress.fetch_add(1, Ordering::SeqCst);
    }

    fn ingestion_complete(&self) {
        self.ingested.fetch_add(1, Ordering::SeqCst);
    }

    fn finished(&self, _summary: &RunSummary) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

/// Delays the first response to each path past the client read timeout.
struct FlakyOnce {
    seen: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl Respond for FlakyOnce {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let first = self
            .seen
            .lock()
            .unwrap()
            .insert(request.url.path().to_string());
        if first {
            ResponseTemplate::new(200).set_delay(Duration::from_secs(2))
        } else {
            ResponseTemplate::new(200)
        }
    }
}

fn test_config() -> PipelineConfig {
    PipelineConfig::for_parallelism(2)
        .with_io_tasks_per_core(4)
        .with_block_size(256)
        .with_queue_capacity(8)
        .with_poll_timeout(Duration::from_millis(50))
        .with_progress_interval(Duration::from_millis(20))
        .with_timeouts(Duration::from_secs(2), Duration::from_millis(500))
}

fn write_url_files(dir: &TempDir, base: &str, files: usize, per_file: usize, route: &str) -> usize {
    for file in 0..files {
        let content: String = (0..per_file)
            .map(|line| format!("{base}/{route}/{file}/{line}\n"))
            .collect();
        std::fs::write(dir.path().join(format!("urls-{file}.txt")), content).unwrap();
    }
    files * per_file
}

fn build_pipeline(
    dir: &TempDir,
    config: PipelineConfig,
    reporter: Arc<CountingReporter>,
) -> (Pipeline, Arc<AdaptiveConnectionAllocator>) {
    let registry = Arc::new(FileRegistry::scan(dir.path()).unwrap());
    let allocator = Arc::new(
        AdaptiveConnectionAllocator::new(
            config.total_connections(),
            config.connect_timeout,
            config.read_timeout,
        )
        .unwrap(),
    );
    let fetcher = Arc::new(HttpFetcher::new(Arc::clone(&allocator)));
    let pipeline =
        Pipeline::new(config, registry, Arc::clone(&allocator), fetcher, reporter).unwrap();
    (pipeline, allocator)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_files_all_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/ok/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("fine"))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let expected = write_url_files(&dir, &server.uri(), 3, 50, "ok");
    let reporter = Arc::new(CountingReporter::default());
    let (pipeline, allocator) = build_pipeline(&dir, test_config(), Arc::clone(&reporter));
    let progress = pipeline.progress();

    let summary = pipeline.run().await;

    assert_eq!(summary.success, expected as u64);
    assert_eq!(summary.failure, 0);
    assert!(progress.is_phase_complete(Phase::Ingestion));
    assert!(progress.is_phase_complete(Phase::Fetch));
    assert_eq!(reporter.ingested.load(Ordering::SeqCst), 1);
    assert_eq!(reporter.finished.load(Ordering::SeqCst), 1);
    assert!(reporter.progress.load(Ordering::SeqCst) >= 1);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), expected);

    // Every URL was counted against the mock server's route.
    let route = bulkfetch_core::route_key(&server.uri()).unwrap();
    assert_eq!(allocator.host_count(&route), expected as u64);
    assert_eq!(allocator.in_flight(&route), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_error_statuses_are_counted_once_as_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/gone/"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let expected = write_url_files(&dir, &server.uri(), 2, 20, "gone");
    let reporter = Arc::new(CountingReporter::default());
    let (pipeline, _) = build_pipeline(&dir, test_config(), reporter);

    let summary = pipeline.run().await;

    assert_eq!(summary.success, 0);
    assert_eq!(summary.failure, expected as u64);
    assert_eq!(summary.workers.retries, 0);
    assert_eq!(server.received_requests().await.unwrap().len(), expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeouts_are_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/flaky/"))
        .respond_with(FlakyOnce {
            seen: std::sync::Mutex::default(),
        })
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let expected = write_url_files(&dir, &server.uri(), 1, 5, "flaky");
    let reporter = Arc::new(CountingReporter::default());
    let (pipeline, _) = build_pipeline(&dir, test_config(), reporter);

    let summary = pipeline.run().await;

    assert_eq!(summary.success, expected as u64);
    assert_eq!(summary.failure, 0);
    assert_eq!(summary.workers.retries, expected as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_malformed_lines_are_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let uri = server.uri();
    std::fs::write(
        dir.path().join("mixed.txt"),
        format!("{uri}/a\nnot a url\n{uri}/b\n\n::::\n"),
    )
    .unwrap();
    let reporter = Arc::new(CountingReporter::default());
    let (pipeline, _) = build_pipeline(&dir, test_config(), reporter);

    let summary = pipeline.run().await;

    assert_eq!(summary.success, 2);
    assert_eq!(summary.failure, 0);
    assert_eq!(summary.workers.skipped, 2);
}
