//! Run-wide progress tracking.
//!
//! [`ProgressReport`] holds the aggregate success/failure counters and one
//! completion flag per pipeline [`Phase`]. Fetch workers poll the ingestion
//! flag to decide when they may exit; the progress task polls the fetch flag.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::debug;

/// Pipeline stages, in order. The discriminant is the index into the flag array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Reader tasks turning file blocks into batches.
    Ingestion = 0,
    /// Fetch workers draining the queue.
    Fetch = 1,
}

impl Phase {
    /// Number of pipeline phases.
    pub const COUNT: usize = 2;

    fn index(self) -> usize {
        self as usize
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// URLs that resolved with a status below 400.
    pub success: u64,
    /// URLs that resolved with a status of 400 or above.
    pub failure: u64,
}

impl ProgressSnapshot {
    /// Returns `success + failure`.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.success + self.failure
    }
}

/// Thread-safe counters plus write-once phase flags.
///
/// Counters are updated together under one lock so a snapshot never shows a
/// half-applied batch. Phase flags only ever go from `false` to `true`.
#[derive(Debug, Default)]
pub struct ProgressReport {
    counts: Mutex<ProgressSnapshot>,
    phases: [AtomicBool; Phase::COUNT],
}

impl ProgressReport {
    /// Creates a report with zero counts and no completed phases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds to the running totals.
    pub fn add(&self, success: u64, failure: u64) {
        let mut counts = self
            .counts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        counts.success += success;
        counts.failure += failure;
    }

    /// Returns the current totals.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        *self
            .counts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Marks `phase` complete. Calling it again has no effect.
    pub fn mark_phase_complete(&self, phase: Phase) {
        let was_complete = self.phases[phase.index()].swap(true, Ordering::SeqCst);
        if !was_complete {
            debug!(?phase, "phase marked complete");
        }
    }

    /// Returns whether `phase` has been marked complete.
    #[must_use]
    pub fn is_phase_complete(&self, phase: Phase) -> bool {
        self.phases[phase.index()].load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_progress_report_starts_empty() {
        let progress = ProgressReport::new();
        assert_eq!(progress.snapshot(), ProgressSnapshot::default());
        assert!(!progress.is_phase_complete(Phase::Ingestion));
        assert!(!progress.is_phase_complete(Phase::Fetch));
    }

    #[test]
    fn test_progress_report_add_accumulates() {
        let progress = ProgressReport::new();
        progress.add(3, 1);
        progress.add(2, 0);

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.success, 5);
        assert_eq!(snapshot.failure, 1);
        assert_eq!(snapshot.total(), 6);
    }

    #[test]
    fn test_progress_report_add_thread_safe() {
        let progress = Arc::new(ProgressReport::new());
        let mut handles = Vec::new();

        for _ in 0..10 {
            let progress = Arc::clone(&progress);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    progress.add(2, 1);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.success, 2000);
        assert_eq!(snapshot.failure, 1000);
    }

    #[test]
    fn test_mark_phase_complete_is_idempotent() {
        let progress = ProgressReport::new();
        progress.mark_phase_complete(Phase::Ingestion);
        progress.mark_phase_complete(Phase::Ingestion);

        assert!(progress.is_phase_complete(Phase::Ingestion));
        assert!(!progress.is_phase_complete(Phase::Fetch));
    }

    #[test]
    fn test_phase_flag_never_reverts_for_concurrent_observers() {
        let progress = Arc::new(ProgressReport::new());
        let mut observers = Vec::new();

        for _ in 0..8 {
            let progress = Arc::clone(&progress);
            observers.push(thread::spawn(move || {
                let mut seen_complete = false;
                for _ in 0..10_000 {
                    let complete = progress.is_phase_complete(Phase::Fetch);
                    assert!(!(seen_complete && !complete), "flag went back to false");
                    seen_complete |= complete;
                }
            }));
        }

        progress.mark_phase_complete(Phase::Fetch);
        progress.mark_phase_complete(Phase::Fetch);

        for observer in observers {
            observer.join().unwrap();
        }
        assert!(progress.is_phase_complete(Phase::Fetch));
    }
}
