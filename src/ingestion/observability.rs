use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, error, info, warn};

use crate::execution::{LoadEvent, LoadObserver};

/// Severity classification of a [`LoadEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventSeverity {
    /// Progress detail.
    Debug,
    /// Informational event.
    Info,
    /// Something was dropped or delayed, but the run continues.
    Warning,
    /// A batch failed.
    Error,
}

impl EventSeverity {
    pub fn of(event: &LoadEvent) -> Self {
        match event {
            LoadEvent::FileStarted { .. } | LoadEvent::BatchConflicted { .. } => EventSeverity::Debug,
            LoadEvent::RunStarted { .. }
            | LoadEvent::BatchCommitted { .. }
            | LoadEvent::FileFinished { .. }
            | LoadEvent::RunFinished { .. } => EventSeverity::Info,
            LoadEvent::RowRejected { .. }
            | LoadEvent::OperationSkipped { .. }
            | LoadEvent::RateLimited { .. } => EventSeverity::Warning,
            LoadEvent::BatchFailed { .. } => EventSeverity::Error,
        }
    }
}

/// An observer that fans out events to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn LoadObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn LoadObserver>>) -> Self {
        Self { observers }
    }

    pub fn push(&mut self, observer: Arc<dyn LoadObserver>) {
        self.observers.push(observer);
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl LoadObserver for CompositeObserver {
    fn on_event(&self, event: &LoadEvent) {
        for o in &self.observers {
            o.on_event(event);
        }
    }
}

/// Emits every event as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl LoadObserver for TracingObserver {
    fn on_event(&self, event: &LoadEvent) {
        match event {
            LoadEvent::RunStarted { root } => info!(root = %root.display(), "load started"),
            LoadEvent::FileStarted { path } => debug!(path = %path.display(), "loading file"),
            LoadEvent::RowRejected { path, line, reason } => {
                warn!(path = %path.display(), line, %reason, "row rejected")
            }
            LoadEvent::OperationSkipped {
                partition_key,
                row_key,
                reason,
            } => warn!(%partition_key, %row_key, %reason, "insert skipped"),
            LoadEvent::BatchCommitted {
                partition_key,
                size,
                elapsed,
                ..
            } => info!(
                %partition_key,
                elapsed_ms = elapsed.as_millis() as u64,
                size,
                "batch committed"
            ),
            LoadEvent::BatchConflicted { partition_key, size } => {
                debug!(%partition_key, size, "batch already present, skipped")
            }
            LoadEvent::RateLimited {
                partition_key,
                attempt,
                backoff,
            } => warn!(
                %partition_key,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "rate limited, backing off"
            ),
            LoadEvent::BatchFailed {
                partition_key,
                size,
                error,
            } => error!(%partition_key, size, %error, "batch failed"),
            LoadEvent::FileFinished {
                path,
                records,
                rejected,
                batches,
            } => info!(path = %path.display(), records, rejected, batches, "file loaded"),
            LoadEvent::RunFinished { elapsed, metrics } => {
                info!(elapsed_ms = elapsed.as_millis() as u64, %metrics, "load finished")
            }
        }
    }
}

/// Appends one `timestamp, elapsed_ms, batch_size` line per committed batch to a file.
#[derive(Debug)]
pub struct ThroughputLogObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ThroughputLogObserver {
    /// Create an observer that appends to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{line}");
        }
    }
}

impl LoadObserver for ThroughputLogObserver {
    fn on_event(&self, event: &LoadEvent) {
        if let Some(line) = event.throughput_line() {
            self.append_line(&line);
        }
    }
}
