//! Where progress goes while a run is in flight.
//!
//! The pipeline calls a [`ProgressReporter`] on a fixed interval and at the
//! two phase boundaries. [`ConsoleReporter`] writes the plain-text lines the
//! tool has always printed to stdout; tracing output stays on stderr.

use tracing::warn;

use crate::pipeline::RunSummary;
use crate::progress::ProgressSnapshot;

/// Sink for progress events.
pub trait ProgressReporter: Send + Sync {
    /// Called periodically with the current counts.
    fn progress(&self, snapshot: ProgressSnapshot);

    /// Called once after every input file has been read.
    fn ingestion_complete(&self);

    /// Called once after every worker has exited.
    fn finished(&self, summary: &RunSummary);
}

/// Writes progress to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleReporter {
    json: bool,
}

impl ConsoleReporter {
    /// Plain-text reporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reporter that prints the final summary as JSON.
    #[must_use]
    pub fn json() -> Self {
        Self { json: true }
    }
}

impl ProgressReporter for ConsoleReporter {
    fn progress(&self, snapshot: ProgressSnapshot) {
        println!("{}", format_progress(snapshot));
    }

    fn ingestion_complete(&self) {
        println!("FILE READ COMPLETE");
    }

    fn finished(&self, summary: &RunSummary) {
        if self.json {
            match serde_json::to_string_pretty(summary) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!(error = %e, "failed to serialize run summary"),
            }
        } else {
            println!("{}", format_finished(summary));
        }
    }
}

/// `TOTAL: t\t\tSUCCESS: s\t\tFAILURE: f`
#[must_use]
pub fn format_progress(snapshot: ProgressSnapshot) -> String {
    format!(
        "TOTAL: {}\t\tSUCCESS: {}\t\tFAILURE: {}",
        snapshot.total(),
        snapshot.success,
        snapshot.failure
    )
}

/// Final counts followed by `TIME TAKEN: n secs`.
#[must_use]
pub fn format_finished(summary: &RunSummary) -> String {
    let counts = format_progress(ProgressSnapshot {
        success: summary.success,
        failure: summary.failure,
    });
    format!("{counts}\nTIME TAKEN: {} secs", summary.elapsed.as_secs())
}
