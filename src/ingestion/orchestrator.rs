//! End-to-end loading of a directory of files.
//!
//! [`Loader`] owns the target table handle and drives, for every file:
//! parse → group → chunk → execute.

use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{LoadError, LoadResult};
use crate::execution::{
    BatchExecutor, ExecutionOptions, FailedBatch, FailurePolicy, LoadEvent, LoadMetrics, LoadMetricsSnapshot,
    LoadObserver, RetryPolicy, TableHandle,
};
use crate::processing::{BatchPlanner, PlannerOptions, SkippedOperation};
use crate::record::{FlightRecord, TableRecord};
use crate::store::{TableStore, validate_table_name};
use crate::types::MAX_BATCH_SIZE;

use super::csv::{ParseOptions, RowFailure, parse_file};

/// Options controlling a load run.
///
/// Use [`Default`] for the reference behaviour: table `flights`, batches of 100, one retry
/// after 1 s on throttling, abort on any other store error.
#[derive(Clone)]
pub struct LoadOptions {
    /// Target table name.
    pub table_name: String,
    /// Operations per batch, `1..=100`.
    pub batch_size: usize,
    /// Stop reading a file after this many records.
    pub max_records_per_file: Option<usize>,
    /// Field delimiter byte.
    pub delimiter: u8,
    pub retry: RetryPolicy,
    pub failure_policy: FailurePolicy,
    /// Partitions executed concurrently; `1` is fully sequential.
    pub max_concurrent_partitions: usize,
    /// Threads used to chunk partition groups. `None` uses available parallelism.
    pub chunk_threads: Option<usize>,
    /// Only load files whose name matches this glob (e.g. `*.csv`).
    pub file_pattern: Option<String>,
    /// Optional observer for logging/metrics.
    pub observer: Option<Arc<dyn LoadObserver>>,
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("table_name", &self.table_name)
            .field("batch_size", &self.batch_size)
            .field("max_records_per_file", &self.max_records_per_file)
            .field("delimiter", &(self.delimiter as char))
            .field("retry", &self.retry)
            .field("failure_policy", &self.failure_policy)
            .field("max_concurrent_partitions", &self.max_concurrent_partitions)
            .field("chunk_threads", &self.chunk_threads)
            .field("file_pattern", &self.file_pattern)
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            table_name: "flights".to_string(),
            batch_size: MAX_BATCH_SIZE,
            max_records_per_file: None,
            delimiter: b',',
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::default(),
            max_concurrent_partitions: 1,
            chunk_threads: None,
            file_pattern: None,
            observer: None,
        }
    }
}

impl LoadOptions {
    /// Check the options that no pipeline stage validates on its own.
    ///
    /// Batch size, concurrency and thread counts are checked when the planner and executor
    /// are built in [`Loader::new`].
    pub fn validate(&self) -> LoadResult<()> {
        validate_table_name(&self.table_name).map_err(|e| LoadError::InvalidOptions {
            message: e.to_string(),
        })?;
        if matches!(self.delimiter, b'"' | b'\n' | b'\r') {
            return Err(LoadError::InvalidOptions {
                message: format!("unusable delimiter {:?}", self.delimiter as char),
            });
        }
        if self.max_records_per_file == Some(0) {
            return Err(LoadError::InvalidOptions {
                message: "max_records_per_file must be > 0 when set".to_string(),
            });
        }
        Ok(())
    }
}

/// Outcome of loading one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    /// Data lines read, excluding the header.
    pub lines_read: usize,
    /// Records parsed successfully.
    pub records: usize,
    pub rejected_rows: Vec<RowFailure>,
    pub partitions: usize,
    /// Batches handed to the executor.
    pub batches: usize,
    pub skipped_operations: Vec<SkippedOperation>,
    pub batches_committed: usize,
    pub batches_conflicted: usize,
    pub records_committed: usize,
    pub retries: u32,
    /// Only populated under [`FailurePolicy::Continue`].
    pub failed_batches: Vec<FailedBatch>,
}

/// Outcome of loading a directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub root: PathBuf,
    pub files: Vec<FileReport>,
    pub metrics: LoadMetricsSnapshot,
}

impl RunReport {
    /// Failed batches across all files.
    pub fn failed_batches(&self) -> usize {
        self.files.iter().map(|f| f.failed_batches.len()).sum()
    }

    /// Records committed across all files.
    pub fn records_committed(&self) -> usize {
        self.files.iter().map(|f| f.records_committed).sum()
    }
}

/// Loads delimited files into a table, one file at a time.
pub struct Loader<R = FlightRecord> {
    executor: BatchExecutor,
    planner: BatchPlanner,
    parse: ParseOptions,
    pattern: Option<glob::Pattern>,
    observer: Option<Arc<dyn LoadObserver>>,
    metrics: Arc<LoadMetrics>,
    _record: PhantomData<fn() -> R>,
}

impl<R: TableRecord> Loader<R> {
    /// Create a loader writing to `options.table_name` on `store`.
    pub fn new(store: Arc<dyn TableStore>, options: LoadOptions) -> LoadResult<Self> {
        options.validate()?;
        let pattern = options
            .file_pattern
            .as_deref()
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| LoadError::InvalidOptions {
                message: format!("invalid file pattern: {e}"),
            })?;

        let planner = BatchPlanner::new(PlannerOptions {
            batch_size: options.batch_size,
            num_threads: options.chunk_threads,
        })?;

        let metrics = Arc::new(LoadMetrics::new());
        let table = Arc::new(TableHandle::new(store, options.table_name));
        let mut executor = BatchExecutor::new(
            table,
            ExecutionOptions {
                retry: options.retry,
                failure_policy: options.failure_policy,
                max_concurrent_partitions: options.max_concurrent_partitions,
            },
        )?
        .with_metrics(Arc::clone(&metrics));
        if let Some(obs) = &options.observer {
            executor = executor.with_observer(Arc::clone(obs));
        }

        Ok(Self {
            executor,
            planner,
            parse: ParseOptions {
                delimiter: options.delimiter,
                max_records: options.max_records_per_file,
            },
            pattern,
            observer: options.observer,
            metrics,
            _record: PhantomData,
        })
    }

    /// Get a handle to real-time metrics.
    pub fn metrics(&self) -> Arc<LoadMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The table this loader writes to.
    pub fn table(&self) -> &TableHandle {
        self.executor.table()
    }

    /// Files directly inside `dir` (non-recursive), sorted by name, filtered by the pattern.
    pub fn list_files(&self, dir: impl AsRef<Path>) -> LoadResult<Vec<PathBuf>> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            let message = if dir.exists() {
                "not a directory"
            } else {
                "no such directory"
            };
            return Err(LoadError::InvalidInputPath {
                path: dir.to_path_buf(),
                message: message.to_string(),
            });
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| match e.into_io_error() {
                Some(io) => LoadError::Io(io),
                None => LoadError::InvalidInputPath {
                    path: dir.to_path_buf(),
                    message: "directory loop".to_string(),
                },
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let matches = match &self.pattern {
                Some(p) => entry.file_name().to_str().is_some_and(|name| p.matches(name)),
                None => true,
            };
            if matches {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    /// Load every file in `dir`.
    ///
    /// A fatal error on any file aborts the run; `RunFinished` is still emitted first. Under [`FailurePolicy::Continue`], a run with
    /// failed batches ends with [`LoadError::PartialFailure`] carrying the full report.
    pub async fn load_directory(&self, dir: impl AsRef<Path>) -> LoadResult<RunReport> {
        let dir = dir.as_ref();
        let files = self.list_files(dir)?;
        debug!(dir = %dir.display(), files = files.len(), "files to load");

        self.metrics.begin_run();
        self.emit(LoadEvent::RunStarted {
            root: dir.to_path_buf(),
        });

        let mut report = RunReport {
            root: dir.to_path_buf(),
            ..Default::default()
        };
        for path in files {
            match self.load_file(&path).await {
                Ok(file) => report.files.push(file),
                Err(err) => {
                    self.finish_run();
                    return Err(err);
                }
            }
        }
        report.metrics = self.finish_run();

        match report.failed_batches() {
            0 => Ok(report),
            failed => Err(LoadError::PartialFailure {
                failed,
                report: Box::new(report),
            }),
        }
    }

    /// Parse, group, chunk and execute a single file.
    pub async fn load_file(&self, path: impl AsRef<Path>) -> LoadResult<FileReport> {
        let path = path.as_ref();
        self.emit(LoadEvent::FileStarted {
            path: path.to_path_buf(),
        });

        let parsed = parse_file::<R>(path, &self.parse)?;
        self.metrics.on_rows_rejected(parsed.failures.len());
        for failure in &parsed.failures {
            self.emit(LoadEvent::RowRejected {
                path: path.to_path_buf(),
                line: failure.line,
                reason: failure.reason.clone(),
            });
        }

        let records = parsed.records.len();
        let plan = self.planner.plan(parsed.records);
        self.metrics.on_operations_skipped(plan.skipped.len());
        for skipped in &plan.skipped {
            self.emit(LoadEvent::OperationSkipped {
                partition_key: skipped.partition_key.clone(),
                row_key: skipped.row_key.clone(),
                reason: skipped.reason.clone(),
            });
        }

        let batches = plan.batches.len();
        let summary = self.executor.execute_all(plan.batches).await?;
        self.metrics.on_file_loaded();

        let report = FileReport {
            path: path.to_path_buf(),
            lines_read: parsed.lines_read,
            records,
            rejected_rows: parsed.failures,
            partitions: plan.partitions,
            batches,
            skipped_operations: plan.skipped,
            batches_committed: summary.batches_committed,
            batches_conflicted: summary.batches_conflicted,
            records_committed: summary.records_committed,
            retries: summary.retries,
            failed_batches: summary.failed,
        };
        self.emit(LoadEvent::FileFinished {
            path: report.path.clone(),
            records: report.records,
            rejected: report.rejected_rows.len(),
            batches: report.batches,
        });
        Ok(report)
    }

    fn finish_run(&self) -> LoadMetricsSnapshot {
        let elapsed = self.metrics.end_run();
        let metrics = self.metrics.snapshot();
        self.emit(LoadEvent::RunFinished {
            elapsed,
            metrics: metrics.clone(),
        });
        metrics
    }

    fn emit(&self, event: LoadEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}
