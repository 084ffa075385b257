//! Batch execution against a [`TableStore`].
//!
//! This module sits "above" [`crate::processing`] and provides:
//!
//! - a [`TableHandle`] that ensures its table exists exactly once
//! - the per-batch state machine (commit, conflict, bounded rate-limit retry, failure)
//! - optional per-partition concurrency
//! - real-time metrics + observer hooks for monitoring

mod observer;

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{LoadError, LoadResult};
use crate::store::{StoreError, StoreErrorKind, TableStore};
use crate::types::BatchUnit;

pub use observer::{LoadEvent, LoadMetrics, LoadMetricsSnapshot, LoadObserver};

/// How rate-limited batches are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. The reference behaviour is a single retry.
    pub max_retries: u32,
    /// Fixed wait before each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            backoff: Duration::from_millis(1_000),
        }
    }
}

/// What to do when a batch fails for good (unclassified error or retries exhausted).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failed batch and abort the run.
    #[default]
    Abort,
    /// Record the failure and keep executing the remaining batches.
    Continue,
}

/// Configuration for the [`BatchExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub retry: RetryPolicy,
    pub failure_policy: FailurePolicy,
    /// Partitions executed concurrently. `1` runs every batch sequentially.
    pub max_concurrent_partitions: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            failure_policy: FailurePolicy::Abort,
            max_concurrent_partitions: 1,
        }
    }
}

/// A named table on a store. The table is created at most once per handle.
pub struct TableHandle {
    store: Arc<dyn TableStore>,
    name: String,
    ensured: OnceCell<()>,
}

impl TableHandle {
    pub fn new(store: Arc<dyn TableStore>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            ensured: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    /// Ensure the table exists. Only the first successful call reaches the store.
    pub async fn ensure_exists(&self) -> LoadResult<()> {
        self.ensured
            .get_or_try_init(|| async {
                debug!(table = %self.name, "ensuring table exists");
                self.store.ensure_table_exists(&self.name).await
            })
            .await
            .map(|_| ())
            .map_err(|source| LoadError::Table {
                table: self.name.clone(),
                source,
            })
    }
}

/// Final state of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Committed; `elapsed` covers the successful attempt only.
    Committed { elapsed: Duration, attempts: u32 },
    /// Keys already present; treated as done.
    Conflicted { attempts: u32 },
    /// Unclassified error, or still rate limited after every retry.
    Failed { error: StoreError, attempts: u32 },
}

/// A batch that failed under [`FailurePolicy::Continue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedBatch {
    pub partition_key: String,
    pub size: usize,
    pub attempts: u32,
    pub error: StoreError,
}

/// Totals for one [`BatchExecutor::execute_all`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub batches_committed: usize,
    pub batches_conflicted: usize,
    pub records_committed: usize,
    /// Retries across all batches.
    pub retries: u32,
    pub failed: Vec<FailedBatch>,
}

impl ExecutionSummary {
    fn merge(&mut self, other: ExecutionSummary) {
        self.batches_committed += other.batches_committed;
        self.batches_conflicted += other.batches_conflicted;
        self.records_committed += other.records_committed;
        self.retries += other.retries;
        self.failed.extend(other.failed);
    }
}

/// Runs batches against a table with conflict, retry and failure handling.
pub struct BatchExecutor {
    table: Arc<TableHandle>,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn LoadObserver>>,
    metrics: Arc<LoadMetrics>,
}

impl BatchExecutor {
    /// Create an executor for `table`.
    pub fn new(table: Arc<TableHandle>, opts: ExecutionOptions) -> LoadResult<Self> {
        if opts.max_concurrent_partitions == 0 {
            return Err(LoadError::InvalidOptions {
                message: "max_concurrent_partitions must be > 0".to_string(),
            });
        }
        Ok(Self {
            table,
            opts,
            observer: None,
            metrics: Arc::new(LoadMetrics::new()),
        })
    }

    /// Attach an observer for load events.
    pub fn with_observer(mut self, observer: Arc<dyn LoadObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Report into an existing metrics instance instead of a private one.
    pub fn with_metrics(mut self, metrics: Arc<LoadMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Get a handle to real-time metrics.
    pub fn metrics(&self) -> Arc<LoadMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn table(&self) -> &TableHandle {
        &self.table
    }

    /// Ensure the table exists, then execute every batch.
    ///
    /// Batches of one partition run in the given order. With
    /// [`ExecutionOptions::max_concurrent_partitions`] above one, different partitions run
    /// concurrently. Under [`FailurePolicy::Abort`] the first failed batch stops execution
    /// and is returned as an error.
    pub async fn execute_all(&self, batches: Vec<BatchUnit>) -> LoadResult<ExecutionSummary> {
        self.table.ensure_exists().await?;

        let lanes = split_by_partition(batches);
        let mut results = stream::iter(lanes)
            .map(|lane| self.execute_lane(lane))
            .buffer_unordered(self.opts.max_concurrent_partitions);

        let mut summary = ExecutionSummary::default();
        while let Some(lane) = results.next().await {
            summary.merge(lane?);
        }
        Ok(summary)
    }

    async fn execute_lane(&self, lane: Vec<BatchUnit>) -> LoadResult<ExecutionSummary> {
        let mut summary = ExecutionSummary::default();
        for batch in &lane {
            match self.execute_batch(batch).await {
                BatchOutcome::Committed { attempts, .. } => {
                    summary.batches_committed += 1;
                    summary.records_committed += batch.len();
                    summary.retries += attempts - 1;
                }
                BatchOutcome::Conflicted { attempts } => {
                    summary.batches_conflicted += 1;
                    summary.retries += attempts - 1;
                }
                BatchOutcome::Failed { error, attempts } => {
                    summary.retries += attempts - 1;
                    match self.opts.failure_policy {
                        FailurePolicy::Abort => {
                            return Err(fatal(&batch.partition_key, error, attempts));
                        }
                        FailurePolicy::Continue => summary.failed.push(FailedBatch {
                            partition_key: batch.partition_key.clone(),
                            size: batch.len(),
                            attempts,
                            error,
                        }),
                    }
                }
            }
        }
        Ok(summary)
    }

    /// Run one batch through the submit/retry state machine.
    ///
    /// Never returns an error: the caller decides what a failed batch means.
    pub async fn execute_batch(&self, batch: &BatchUnit) -> BatchOutcome {
        let retry = self.opts.retry;
        let mut attempts = 0u32;
        self.metrics.on_batch_submitted(batch.len());

        loop {
            attempts += 1;
            let start = Instant::now();
            let result = self.table.store().execute_batch(self.table.name(), batch).await;
            let elapsed = start.elapsed();

            let error = match result {
                Ok(()) => {
                    self.metrics.on_batch_committed(batch.len());
                    self.emit(LoadEvent::BatchCommitted {
                        partition_key: batch.partition_key.clone(),
                        size: batch.len(),
                        elapsed,
                        at: chrono::Utc::now(),
                    });
                    return BatchOutcome::Committed { elapsed, attempts };
                }
                Err(e) => e,
            };

            match error.kind() {
                StoreErrorKind::Conflict => {
                    self.metrics.on_batch_conflicted();
                    self.emit(LoadEvent::BatchConflicted {
                        partition_key: batch.partition_key.clone(),
                        size: batch.len(),
                    });
                    return BatchOutcome::Conflicted { attempts };
                }
                StoreErrorKind::RateLimited if attempts <= retry.max_retries => {
                    self.emit(LoadEvent::RateLimited {
                        partition_key: batch.partition_key.clone(),
                        attempt: attempts,
                        backoff: retry.backoff,
                    });
                    self.metrics.on_retry(retry.backoff);
                    tokio::time::sleep(retry.backoff).await;
                }
                StoreErrorKind::RateLimited | StoreErrorKind::Other => {
                    self.metrics.on_batch_failed();
                    self.emit(LoadEvent::BatchFailed {
                        partition_key: batch.partition_key.clone(),
                        size: batch.len(),
                        error: error.clone(),
                    });
                    return BatchOutcome::Failed { error, attempts };
                }
            }
        }
    }

    fn emit(&self, event: LoadEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

fn fatal(partition_key: &str, source: StoreError, attempts: u32) -> LoadError {
    let partition_key = partition_key.to_owned();
    if source.is_rate_limited() {
        LoadError::RetriesExhausted {
            partition_key,
            attempts,
            source,
        }
    } else {
        LoadError::Store {
            partition_key,
            source,
        }
    }
}

/// Split batches into per-partition lanes, keeping first-seen partition order and the order
/// of batches within each partition.
fn split_by_partition(batches: Vec<BatchUnit>) -> Vec<Vec<BatchUnit>> {
    let mut lanes: Vec<Vec<BatchUnit>> = Vec::new();
    let mut index: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for batch in batches {
        match index.get(&batch.partition_key) {
            Some(&i) => lanes[i].push(batch),
            None => {
                index.insert(batch.partition_key.clone(), lanes.len());
                lanes.push(vec![batch]);
            }
        }
    }
    lanes
}
