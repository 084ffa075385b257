use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::{EntityError, RecordError};
use crate::store::StoreError;

/// Events emitted while loading.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    RunStarted { root: PathBuf },
    FileStarted { path: PathBuf },
    RowRejected { path: PathBuf, line: u64, reason: RecordError },
    OperationSkipped { partition_key: String, row_key: String, reason: EntityError },
    /// One batch was committed. This is the per-batch throughput record.
    BatchCommitted {
        partition_key: String,
        size: usize,
        elapsed: Duration,
        at: DateTime<Utc>,
    },
    /// The store reported existing keys; the batch counts as done.
    BatchConflicted { partition_key: String, size: usize },
    /// The store throttled a batch; it is retried after `backoff`.
    RateLimited { partition_key: String, attempt: u32, backoff: Duration },
    BatchFailed { partition_key: String, size: usize, error: StoreError },
    FileFinished {
        path: PathBuf,
        records: usize,
        rejected: usize,
        batches: usize,
    },
    RunFinished {
        elapsed: Duration,
        metrics: LoadMetricsSnapshot,
    },
}

impl LoadEvent {
    /// `timestamp, elapsed_ms, batch_size` for committed batches.
    pub fn throughput_line(&self) -> Option<String> {
        match self {
            LoadEvent::BatchCommitted { size, elapsed, at, .. } => Some(format!(
                "{}, {}, {}",
                at.format("%Y-%m-%dT%H:%M:%SZ"),
                elapsed.as_millis(),
                size
            )),
            _ => None,
        }
    }
}

/// Observer hook for load events.
pub trait LoadObserver: Send + Sync {
    fn on_event(&self, event: &LoadEvent);
}

/// Real-time counters for a load run.
///
/// The executor and orchestrator update these while running; callers can snapshot them at
/// any time.
pub struct LoadMetrics {
    started_at: Mutex<Option<Instant>>,
    elapsed_ns: AtomicU64,

    files_loaded: AtomicU64,
    rows_rejected: AtomicU64,
    operations_skipped: AtomicU64,
    records_submitted: AtomicU64,
    records_committed: AtomicU64,
    batches_committed: AtomicU64,
    batches_conflicted: AtomicU64,
    batches_failed: AtomicU64,
    retries: AtomicU64,
    backoff_ns: AtomicU64,
}

impl LoadMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Mutex::new(None),
            elapsed_ns: AtomicU64::new(0),
            files_loaded: AtomicU64::new(0),
            rows_rejected: AtomicU64::new(0),
            operations_skipped: AtomicU64::new(0),
            records_submitted: AtomicU64::new(0),
            records_committed: AtomicU64::new(0),
            batches_committed: AtomicU64::new(0),
            batches_conflicted: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            backoff_ns: AtomicU64::new(0),
        }
    }

    /// Start a new run. Every counter restarts from zero.
    pub fn begin_run(&self) {
        *self.started_at.lock().expect("metrics mutex poisoned") = Some(Instant::now());
        for counter in [
            &self.elapsed_ns,
            &self.files_loaded,
            &self.rows_rejected,
            &self.operations_skipped,
            &self.records_submitted,
            &self.records_committed,
            &self.batches_committed,
            &self.batches_conflicted,
            &self.batches_failed,
            &self.retries,
            &self.backoff_ns,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    /// Record the run's end; returns the elapsed time since [`Self::begin_run`].
    pub fn end_run(&self) -> Duration {
        let elapsed = self
            .started_at
            .lock()
            .expect("metrics mutex poisoned")
            .map(|s| s.elapsed())
            .unwrap_or_default();
        self.elapsed_ns.store(as_nanos(elapsed), Ordering::SeqCst);
        elapsed
    }

    pub fn on_file_loaded(&self) {
        self.files_loaded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_rows_rejected(&self, n: usize) {
        self.rows_rejected.fetch_add(n as u64, Ordering::SeqCst);
    }

    pub fn on_operations_skipped(&self, n: usize) {
        self.operations_skipped.fetch_add(n as u64, Ordering::SeqCst);
    }

    pub fn on_batch_submitted(&self, size: usize) {
        self.records_submitted.fetch_add(size as u64, Ordering::SeqCst);
    }

    pub fn on_batch_committed(&self, size: usize) {
        self.batches_committed.fetch_add(1, Ordering::SeqCst);
        self.records_committed.fetch_add(size as u64, Ordering::SeqCst);
    }

    pub fn on_batch_conflicted(&self) {
        self.batches_conflicted.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_batch_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_retry(&self, backoff: Duration) {
        self.retries.fetch_add(1, Ordering::SeqCst);
        self.backoff_ns.fetch_add(as_nanos(backoff), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> LoadMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        LoadMetricsSnapshot {
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            files_loaded: self.files_loaded.load(Ordering::SeqCst),
            rows_rejected: self.rows_rejected.load(Ordering::SeqCst),
            operations_skipped: self.operations_skipped.load(Ordering::SeqCst),
            records_submitted: self.records_submitted.load(Ordering::SeqCst),
            records_committed: self.records_committed.load(Ordering::SeqCst),
            batches_committed: self.batches_committed.load(Ordering::SeqCst),
            batches_conflicted: self.batches_conflicted.load(Ordering::SeqCst),
            batches_failed: self.batches_failed.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
            backoff: Duration::from_nanos(self.backoff_ns.load(Ordering::SeqCst)),
        }
    }
}

impl Default for LoadMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn as_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

/// Immutable snapshot of [`LoadMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadMetricsSnapshot {
    pub elapsed: Option<Duration>,
    pub files_loaded: u64,
    pub rows_rejected: u64,
    pub operations_skipped: u64,
    /// Records in every batch handed to the store (first attempt only).
    pub records_submitted: u64,
    pub records_committed: u64,
    pub batches_committed: u64,
    pub batches_conflicted: u64,
    pub batches_failed: u64,
    pub retries: u64,
    pub backoff: Duration,
}

impl fmt::Display for LoadMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "files={}, records_submitted={}, records_committed={}, batches={}/{}/{} (committed/conflicted/failed), rows_rejected={}, ops_skipped={}, retries={}, backoff={:?}, elapsed={:?}",
            self.files_loaded,
            self.records_submitted,
            self.records_committed,
            self.batches_committed,
            self.batches_conflicted,
            self.batches_failed,
            self.rows_rejected,
            self.operations_skipped,
            self.retries,
            self.backoff,
            self.elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throughput_line_format() {
        let at = DateTime::parse_from_rfc3339("2017-03-04T15:06:07Z")
            .unwrap()
            .with_timezone(&Utc);
        let ev = LoadEvent::BatchCommitted {
            partition_key: "JFK".to_string(),
            size: 100,
            elapsed: Duration::from_millis(42),
            at,
        };
        assert_eq!(ev.throughput_line().as_deref(), Some("2017-03-04T15:06:07Z, 42, 100"));
        let other = LoadEvent::BatchConflicted {
            partition_key: "JFK".to_string(),
            size: 1,
        };
        assert!(other.throughput_line().is_none());
    }

    #[test]
    fn snapshot_reflects_counters() {
        let m = LoadMetrics::new();
        m.begin_run();
        m.on_batch_submitted(100);
        m.on_batch_committed(100);
        m.on_batch_submitted(3);
        m.on_batch_conflicted();
        m.on_retry(Duration::from_millis(5));
        m.end_run();

        let snap = m.snapshot();
        assert_eq!(snap.records_submitted, 103);
        assert_eq!(snap.records_committed, 100);
        assert_eq!(snap.batches_committed, 1);
        assert_eq!(snap.batches_conflicted, 1);
        assert_eq!(snap.retries, 1);
        assert_eq!(snap.backoff, Duration::from_millis(5));
    }

    #[test]
    fn begin_run_clears_previous_counters() {
        let m = LoadMetrics::new();
        m.begin_run();
        m.on_file_loaded();
        m.on_rows_rejected(2);
        m.on_batch_submitted(10);
        m.on_batch_committed(10);
        m.on_batch_failed();
        m.on_retry(Duration::from_millis(5));
        m.end_run();

        m.begin_run();
        let snap = m.snapshot();
        assert_eq!(
            snap,
            LoadMetricsSnapshot {
                elapsed: None,
                ..Default::default()
            }
        );
    }
}
