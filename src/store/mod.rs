//! Table store abstraction.
//!
//! The loader talks to the backing store only through [`TableStore`]. Store failures are
//! classified by [`StoreError`] so the executor can tell conflicts and throttling apart from
//! fatal errors.
//!
//! Two implementations ship with the crate:
//!
//! - [`InMemoryTableStore`]: atomic batches over a `HashMap`, with scripted faults for tests
//! - [`LocalTableStore`]: one JSON-lines file per table under a directory
//!
//! [`connect`] builds one of them from a connection string.

pub mod local;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::BatchUnit;

pub use local::LocalTableStore;
pub use memory::InMemoryTableStore;

/// Store client used by the executor.
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Create `table` if it does not exist. Must be idempotent.
    async fn ensure_table_exists(&self, table: &str) -> Result<(), StoreError>;

    /// Apply every operation in `batch` as one atomic transaction.
    async fn execute_batch(&self, table: &str, batch: &BatchUnit) -> Result<(), StoreError>;
}

/// Classification of a [`StoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// A row with the same full key already exists.
    Conflict,
    /// Throughput quota exceeded; retry after a delay.
    RateLimited,
    /// Anything else.
    Other,
}

/// Error returned by a [`TableStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("{}{message}", status.map(|s| format!("status {s}: ")).unwrap_or_default())]
    Other { status: Option<u16>, message: String },
}

impl StoreError {
    /// Classify an HTTP-style status code returned by a store.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            409 => StoreError::Conflict { message },
            429 => StoreError::RateLimited { message },
            _ => StoreError::Other {
                status: Some(status),
                message,
            },
        }
    }

    pub fn kind(&self) -> StoreErrorKind {
        match self {
            StoreError::Conflict { .. } => StoreErrorKind::Conflict,
            StoreError::RateLimited { .. } => StoreErrorKind::RateLimited,
            StoreError::Other { .. } => StoreErrorKind::Other,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == StoreErrorKind::Conflict
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind() == StoreErrorKind::RateLimited
    }

    fn bad_request(message: impl Into<String>) -> Self {
        StoreError::Other {
            status: Some(400),
            message: message.into(),
        }
    }
}

/// Build a store from a connection string.
///
/// Recognized forms:
///
/// - `memory:` for an empty [`InMemoryTableStore`]
/// - `local:<dir>` for a [`LocalTableStore`] rooted at `<dir>`
pub fn connect(connection_string: &str) -> Result<Arc<dyn TableStore>, StoreError> {
    let conn = connection_string.trim();
    if conn == "memory:" {
        return Ok(Arc::new(InMemoryTableStore::new()));
    }
    if let Some(dir) = conn.strip_prefix("local:") {
        if dir.is_empty() {
            return Err(StoreError::bad_request("local: connection string needs a directory"));
        }
        return Ok(Arc::new(LocalTableStore::new(dir)));
    }

    // Do not echo the connection string; it may carry an account key.
    let scheme = conn.split([':', ';', '=']).next().unwrap_or_default();
    Err(StoreError::bad_request(format!(
        "unsupported store endpoint (scheme '{scheme}')"
    )))
}

/// Table names must be 3-63 ASCII alphanumerics starting with a letter.
pub(crate) fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let ok = (3..=63).contains(&table.len())
        && table.chars().all(|c| c.is_ascii_alphanumeric())
        && table.starts_with(|c: char| c.is_ascii_alphabetic());
    if ok {
        Ok(())
    } else {
        Err(StoreError::bad_request(format!("invalid table name '{table}'")))
    }
}

/// Shape checks every store applies before touching data.
///
/// A row key repeated within the batch is a [`StoreError::Conflict`], like a key that is
/// already stored.
pub(crate) fn validate_batch(batch: &BatchUnit) -> Result<(), StoreError> {
    if batch.is_empty() {
        return Err(StoreError::bad_request("empty batch"));
    }
    if batch.len() > crate::types::MAX_BATCH_SIZE {
        return Err(StoreError::bad_request(format!(
            "batch has {} operations, the limit is {}",
            batch.len(),
            crate::types::MAX_BATCH_SIZE
        )));
    }
    let mut seen = std::collections::HashSet::with_capacity(batch.len());
    for op in &batch.operations {
        let entity = op.entity();
        if entity.partition_key != batch.partition_key {
            return Err(StoreError::bad_request(format!(
                "operation for partition '{}' in batch for '{}'",
                entity.partition_key, batch.partition_key
            )));
        }
        if !seen.insert(entity.row_key.as_str()) {
            return Err(StoreError::Conflict {
                message: format!("row key '{}' appears twice in one batch", entity.row_key),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_are_classified() {
        assert_eq!(StoreError::from_status(409, "exists").kind(), StoreErrorKind::Conflict);
        assert_eq!(StoreError::from_status(429, "slow down").kind(), StoreErrorKind::RateLimited);
        assert_eq!(StoreError::from_status(500, "boom").kind(), StoreErrorKind::Other);
    }

    #[test]
    fn other_error_display_includes_status() {
        assert_eq!(StoreError::from_status(503, "unavailable").to_string(), "status 503: unavailable");
        let no_status = StoreError::Other {
            status: None,
            message: "reset".to_string(),
        };
        assert_eq!(no_status.to_string(), "reset");
    }

    #[test]
    fn connect_recognizes_memory_and_local() {
        assert!(connect("memory:").is_ok());
        assert!(connect("local:/tmp/tables").is_ok());
        assert!(connect("local:").is_err());
    }

    #[test]
    fn connect_does_not_leak_secrets() {
        let err = connect("DefaultEndpointsProtocol=https;AccountKey=c2VjcmV0").err().unwrap();
        let msg = err.to_string();
        assert!(!msg.contains("c2VjcmV0"), "{msg}");
        assert!(msg.contains("DefaultEndpointsProtocol"));
    }

    #[test]
    fn table_names_are_validated() {
        assert!(validate_table_name("flights").is_ok());
        assert!(validate_table_name("f1").is_err());
        assert!(validate_table_name("../etc").is_err());
        assert!(validate_table_name("1flights").is_err());
    }

    fn batch(pk: &str, rows: &[&str]) -> BatchUnit {
        BatchUnit {
            partition_key: pk.to_string(),
            operations: rows
                .iter()
                .map(|rk| {
                    crate::types::BatchOperation::insert(crate::types::TableEntity {
                        partition_key: pk.to_string(),
                        row_key: rk.to_string(),
                        properties: Vec::new(),
                    })
                    .unwrap()
                })
                .collect(),
        }
    }

    #[test]
    fn repeated_row_key_in_a_batch_is_a_conflict() {
        let err = validate_batch(&batch("JFK", &["same", "same"])).unwrap_err();
        assert!(err.is_conflict(), "{err}");
        assert!(validate_batch(&batch("JFK", &["a", "b"])).is_ok());
    }

    #[test]
    fn mixed_partitions_are_rejected() {
        let mut b = batch("JFK", &["a"]);
        b.partition_key = "LGA".to_string();
        let err = validate_batch(&b).unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Other);
    }
}
