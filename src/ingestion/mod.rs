//! Ingestion entrypoints and implementations.
//!
//! Most callers should use [`Loader`] (from [`orchestrator`]) which:
//!
//! - enumerates the files of a directory (non-recursive, sorted, optionally glob-filtered)
//! - parses each file into typed records, dropping bad lines into the file report
//! - groups, chunks and executes the batches against a [`crate::store::TableStore`]
//! - optionally reports progress to a [`crate::execution::LoadObserver`]
//!
//! The parser is also available on its own under [`csv`].

pub mod csv;
pub mod observability;
pub mod orchestrator;

pub use observability::{CompositeObserver, EventSeverity, ThroughputLogObserver, TracingObserver};
pub use orchestrator::{FileReport, LoadOptions, Loader, RunReport};
