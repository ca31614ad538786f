//! End-to-end CLI tests for the bulkfetch binary.

use std::io::Write;

use assert_cmd::Command;
use flate2::Compression;
use flate2::write::GzEncoder;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let mut cmd = Command::cargo_bin("bulkfetch").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Issue a GET for every URL"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let mut cmd = Command::cargo_bin("bulkfetch").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("bulkfetch"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let mut cmd = Command::cargo_bin("bulkfetch").unwrap();
    cmd.arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

/// Test that a missing input path fails before any fetching starts.
#[test]
fn test_binary_missing_input_fails() {
    let temp = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("bulkfetch").unwrap();
    cmd.current_dir(temp.path())
        .args(["1", "does-not-exist.gz"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input not found"));
}

/// Test that an unsupported archive format is rejected at startup.
#[test]
fn test_binary_unsupported_archive_fails() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("inputData.tar"), b"").unwrap();

    let mut cmd = Command::cargo_bin("bulkfetch").unwrap();
    cmd.current_dir(temp.path())
        .args(["1", "inputData.tar"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported"));
}

/// Test a full run over a directory of URL files.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_fetches_directory_and_prints_totals() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let input = temp.path().join("urls");
    std::fs::create_dir(&input).unwrap();
    let content: String = (0..30).map(|i| format!("{}/item/{i}\n", server.uri())).collect();
    std::fs::write(input.join("part-0.txt"), content).unwrap();

    let assert = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("bulkfetch")
            .unwrap()
            .arg("2")
            .arg(&input)
            .args(["--io-tasks-per-core", "4", "-q"])
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("FILE READ COMPLETE"))
        .stdout(predicate::str::contains("TOTAL: 30\t\tSUCCESS: 30\t\tFAILURE: 0"))
        .stdout(predicate::str::contains("TIME TAKEN:"));
    assert_eq!(server.received_requests().await.unwrap().len(), 30);
}

/// Test that a .gz archive is extracted into the work directory and read.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_extracts_archive_and_reports_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("inputData.gz");
    let mut encoder = GzEncoder::new(
        std::fs::File::create(&archive).unwrap(),
        Compression::default(),
    );
    for i in 0..12 {
        writeln!(encoder, "{}/missing/{i}", server.uri()).unwrap();
    }
    encoder.finish().unwrap();

    let workdir = temp.path().to_path_buf();
    let assert = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("bulkfetch")
            .unwrap()
            .current_dir(&workdir)
            .args(["1", "inputData.gz", "--io-tasks-per-core", "2", "--json", "-q"])
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("\"failure\": 12"))
        .stdout(predicate::str::contains("\"success\": 0"));
    assert!(temp.path().join("work_area").join("inputData").is_file());
}

/// Test that the default zip input of gzip parts is unpacked and fetched.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_binary_reads_default_zip_of_gzip_parts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let archive = std::fs::File::create(temp.path().join("inputData.zip")).unwrap();
    let mut writer = ZipWriter::new(archive);
    writer
        .add_directory("inputData/", SimpleFileOptions::default())
        .unwrap();
    for part in 0..3 {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        for i in 0..10 {
            writeln!(encoder, "{}/part/{part}/{i}", server.uri()).unwrap();
        }
        writer
            .start_file(format!("inputData/part-{part}.gz"), SimpleFileOptions::default())
            .unwrap();
        writer.write_all(&encoder.finish().unwrap()).unwrap();
    }
    writer.finish().unwrap();

    let workdir = temp.path().to_path_buf();
    let assert = tokio::task::spawn_blocking(move || {
        Command::cargo_bin("bulkfetch")
            .unwrap()
            .current_dir(&workdir)
            .args(["--io-tasks-per-core", "2", "-q"])
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("TOTAL: 30\t\tSUCCESS: 30\t\tFAILURE: 0"));
    assert_eq!(server.received_requests().await.unwrap().len(), 30);
    let work_area = temp.path().join("work_area");
    for part in 0..3 {
        assert!(work_area.join(format!("part-{part}")).is_file());
    }
}
