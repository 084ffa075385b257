use std::path::PathBuf;

use thiserror::Error;

use crate::ingestion::RunReport;
use crate::store::StoreError;

/// Convenience result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Fatal, run-level error.
///
/// Anything returned as a `LoadError` aborts the current run. Row-level problems are reported
/// as [`RecordError`]/[`EntityError`] inside per-file reports instead.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Underlying I/O error (e.g. a file disappeared mid-run, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The CSV reader failed in a way that is not attributable to a single row.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The input folder does not exist or is not a directory.
    #[error("invalid input path '{}': {message}", path.display())]
    InvalidInputPath { path: PathBuf, message: String },

    /// The options passed to the loader are inconsistent.
    #[error("invalid options: {message}")]
    InvalidOptions { message: String },

    /// The store rejected a batch with an error that is not retried.
    #[error("store error on partition '{partition_key}': {source}")]
    Store {
        partition_key: String,
        #[source]
        source: StoreError,
    },

    /// The store kept rate-limiting a batch after every allowed retry.
    #[error("partition '{partition_key}' still rate limited after {attempts} attempts: {source}")]
    RetriesExhausted {
        partition_key: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },

    /// Ensuring the target table exists failed.
    #[error("failed to ensure table '{table}' exists: {source}")]
    Table {
        table: String,
        #[source]
        source: StoreError,
    },

    /// One or more batches failed while running with `FailurePolicy::Continue`.
    #[error("{failed} batch(es) failed while loading {}", report.root.display())]
    PartialFailure {
        failed: usize,
        report: Box<RunReport>,
    },
}

impl LoadError {
    /// Process exit code for this error.
    ///
    /// - `2`: bad input path
    /// - `3`: store failure (run aborted, possibly after partial ingestion)
    /// - `4`: some batches failed but the run continued
    /// - `1`: anything else (options, local I/O)
    pub fn exit_code(&self) -> u8 {
        match self {
            LoadError::InvalidInputPath { .. } => 2,
            LoadError::Store { .. } | LoadError::RetriesExhausted { .. } | LoadError::Table { .. } => 3,
            LoadError::PartialFailure { .. } => 4,
            LoadError::Io(_) | LoadError::Csv(_) | LoadError::InvalidOptions { .. } => 1,
        }
    }

    /// Returns true if the store (not local input) caused the failure.
    pub fn is_store_failure(&self) -> bool {
        self.exit_code() == 3
    }
}

/// Why a single input line was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The line has fewer columns than the schema requires.
    #[error("expected at least {expected} columns, found {found}")]
    MissingColumns { expected: usize, found: usize },

    /// A value could not be converted to its column type.
    #[error("failed to parse column '{column}': {message} (raw='{raw}')")]
    InvalidValue {
        column: String,
        raw: String,
        message: String,
    },

    /// The partition key column is empty.
    #[error("partition key column '{column}' is empty")]
    EmptyPartitionKey { column: String },

    /// The line could not be decoded at all (bad quoting, invalid UTF-8).
    #[error("malformed line: {message}")]
    Malformed { message: String },
}

/// Why an insert operation could not be built for an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    /// A partition or row key violates the store's key rules.
    #[error("invalid {key} '{value}': {reason}")]
    InvalidKey {
        key: &'static str,
        value: String,
        reason: String,
    },

    /// The entity carries more properties than the store accepts.
    #[error("entity has {count} properties, the limit is {limit}")]
    TooManyProperties { count: usize, limit: usize },
}
