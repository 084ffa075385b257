//! `table-loader` bulk-loads delimited flat files into a partitioned table store.
//!
//! Records are parsed into a typed [`record::TableRecord`], grouped by partition key, chunked
//! into atomic batches of at most [`types::MAX_BATCH_SIZE`] inserts, and executed against a
//! [`store::TableStore`] with conflict and rate-limit handling.
//!
//! The primary entrypoint is [`ingestion::Loader`], which loads every file in a directory.
//!
//! ## Pipeline
//!
//! 1. **Parse** ([`ingestion::csv`]): skip the header, read the first N columns of each line
//!    into a record. Bad lines are dropped and listed in the file report.
//! 2. **Group** ([`processing::group_by_partition`]): one group per partition key, input order
//!    kept within a group.
//! 3. **Chunk** ([`processing::chunk_group`]): `ceil(M / B)` batches per group. Entities the
//!    store would reject are skipped one by one.
//! 4. **Execute** ([`execution::BatchExecutor`]): ensure the table once, then run each batch.
//!    Conflicts count as done, rate limits are retried after a fixed backoff, anything else
//!    aborts the run (or is recorded, with [`execution::FailurePolicy::Continue`]).
//!
//! ## Quick example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use table_loader::ingestion::{LoadOptions, Loader, TracingObserver};
//! use table_loader::record::FlightRecord;
//! use table_loader::store::InMemoryTableStore;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), table_loader::LoadError> {
//! let store = Arc::new(InMemoryTableStore::new());
//! let opts = LoadOptions {
//!     observer: Some(Arc::new(TracingObserver)),
//!     ..Default::default()
//! };
//! let loader: Loader<FlightRecord> = Loader::new(store.clone(), opts)?;
//! let report = loader.load_directory("data/flights").await?;
//! println!("records={} rows={}", report.records_committed(), store.row_count("flights"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: directory orchestration, CSV parsing, observers
//! - [`processing`]: grouping and chunking
//! - [`execution`]: batch execution, retry, metrics
//! - [`store`]: store trait, error classification, bundled stores
//! - [`record`]: typed records and the flight schema
//! - [`types`]: schema, entity and batch types
//! - [`config`]: store tier and connection settings
//! - [`error`]: error types

pub mod config;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod logging;
pub mod processing;
pub mod record;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{EntityError, LoadError, LoadResult, RecordError};
