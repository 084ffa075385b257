use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::types::{BatchUnit, TableEntity};

use super::{StoreError, TableStore, validate_batch, validate_table_name};

type Table = HashMap<(String, String), TableEntity>;

/// In-process table store with the same batch semantics as the remote one.
///
/// A batch is rejected as a whole with [`StoreError::Conflict`] if any of its keys already
/// exists. Faults queued with [`InMemoryTableStore::fail_next`] are returned by the next
/// `execute_batch` calls, in order, before any data is touched.
#[derive(Default)]
pub struct InMemoryTableStore {
    tables: Mutex<HashMap<String, Table>>,
    faults: Mutex<VecDeque<StoreError>>,
    batch_calls: AtomicUsize,
    ensure_calls: AtomicUsize,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next `execute_batch` call.
    pub fn fail_next(&self, error: StoreError) {
        self.faults.lock().expect("store mutex poisoned").push_back(error);
    }

    /// Number of `execute_batch` calls so far, including failed ones.
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    /// Number of `ensure_table_exists` calls so far.
    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    /// Number of rows stored in `table`.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .get(table)
            .map_or(0, HashMap::len)
    }

    /// Rows stored in `table` for one partition, in no particular order.
    pub fn partition(&self, table: &str, partition_key: &str) -> Vec<TableEntity> {
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .get(table)
            .map(|t| {
                t.values()
                    .filter(|e| e.partition_key == partition_key)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Insert rows directly, bypassing batch checks. Used to pre-seed a table.
    pub fn seed(&self, table: &str, entities: impl IntoIterator<Item = TableEntity>) {
        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let t = tables.entry(table.to_string()).or_default();
        for e in entities {
            t.insert((e.partition_key.clone(), e.row_key.clone()), e);
        }
    }
}

impl fmt::Debug for InMemoryTableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryTableStore")
            .field("batch_calls", &self.batch_calls())
            .field("ensure_calls", &self.ensure_calls())
            .finish()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn ensure_table_exists(&self, table: &str) -> Result<(), StoreError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        validate_table_name(table)?;
        self.tables
            .lock()
            .expect("store mutex poisoned")
            .entry(table.to_string())
            .or_default();
        Ok(())
    }

    async fn execute_batch(&self, table: &str, batch: &BatchUnit) -> Result<(), StoreError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.faults.lock().expect("store mutex poisoned").pop_front() {
            return Err(fault);
        }
        validate_batch(batch)?;

        let mut tables = self.tables.lock().expect("store mutex poisoned");
        let t = tables.get_mut(table).ok_or_else(|| StoreError::Other {
            status: Some(404),
            message: format!("table '{table}' not found"),
        })?;

        if let Some(existing) = batch
            .operations
            .iter()
            .map(|op| op.entity())
            .find(|e| t.contains_key(&(e.partition_key.clone(), e.row_key.clone())))
        {
            return Err(StoreError::Conflict {
                message: format!(
                    "entity ({}, {}) already exists",
                    existing.partition_key, existing.row_key
                ),
            });
        }

        for op in &batch.operations {
            let e = op.entity();
            t.insert((e.partition_key.clone(), e.row_key.clone()), e.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchOperation;

    fn batch(pk: &str, rows: &[&str]) -> BatchUnit {
        BatchUnit {
            partition_key: pk.to_string(),
            operations: rows
                .iter()
                .map(|rk| {
                    BatchOperation::insert(TableEntity {
                        partition_key: pk.to_string(),
                        row_key: rk.to_string(),
                        properties: Vec::new(),
                    })
                    .unwrap()
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn batch_is_rejected_whole_on_conflict() {
        let store = InMemoryTableStore::new();
        store.ensure_table_exists("flights").await.unwrap();
        store.execute_batch("flights", &batch("JFK", &["a"])).await.unwrap();

        let err = store
            .execute_batch("flights", &batch("JFK", &["b", "a", "c"]))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert_eq!(store.row_count("flights"), 1);
    }

    #[tokio::test]
    async fn mixed_partitions_are_rejected() {
        let store = InMemoryTableStore::new();
        store.ensure_table_exists("flights").await.unwrap();
        let mut b = batch("JFK", &["a"]);
        b.operations.extend(batch("LGA", &["b"]).operations);

        let err = store.execute_batch("flights", &b).await.unwrap_err();
        assert_eq!(err.kind(), super::super::StoreErrorKind::Other);
        assert_eq!(store.row_count("flights"), 0);
    }

    #[tokio::test]
    async fn missing_table_is_an_error() {
        let store = InMemoryTableStore::new();
        let err = store.execute_batch("flights", &batch("JFK", &["a"])).await.unwrap_err();
        assert!(matches!(err, StoreError::Other { status: Some(404), .. }));
    }

    #[tokio::test]
    async fn queued_faults_are_returned_in_order() {
        let store = InMemoryTableStore::new();
        store.ensure_table_exists("flights").await.unwrap();
        store.fail_next(StoreError::from_status(429, "slow down"));
        store.fail_next(StoreError::from_status(500, "boom"));

        let first = store.execute_batch("flights", &batch("JFK", &["a"])).await.unwrap_err();
        let second = store.execute_batch("flights", &batch("JFK", &["a"])).await.unwrap_err();
        store.execute_batch("flights", &batch("JFK", &["a"])).await.unwrap();

        assert!(first.is_rate_limited());
        assert!(matches!(second, StoreError::Other { status: Some(500), .. }));
        assert_eq!(store.batch_calls(), 3);
        assert_eq!(store.row_count("flights"), 1);
    }
}
