use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::types::{BatchUnit, TableEntity};

use super::{StoreError, TableStore, validate_batch, validate_table_name};

/// Directory-backed table store: one `<table>.jsonl` file per table.
///
/// Keys of existing rows are loaded when a table is ensured, so inserts of already stored
/// keys fail with [`StoreError::Conflict`] across runs. A batch is written with a single
/// append.
#[derive(Debug)]
pub struct LocalTableStore {
    root: PathBuf,
    keys: Mutex<HashMap<String, HashSet<(String, String)>>>,
}

#[derive(Deserialize)]
struct StoredKeys {
    #[serde(rename = "PartitionKey")]
    partition_key: String,
    #[serde(rename = "RowKey")]
    row_key: String,
}

impl LocalTableStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            keys: Mutex::new(HashMap::new()),
        }
    }

    /// Path of the file backing `table`.
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.root.join(format!("{table}.jsonl"))
    }

    async fn load_keys(&self, path: &Path) -> Result<HashSet<(String, String)>, StoreError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
            Err(e) => return Err(io_error(path, e)),
        };

        let mut keys = HashSet::new();
        for (i, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
            let k: StoredKeys = serde_json::from_str(line).map_err(|e| StoreError::Other {
                status: None,
                message: format!("{}:{}: {e}", path.display(), i + 1),
            })?;
            keys.insert((k.partition_key, k.row_key));
        }
        Ok(keys)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Other {
        status: None,
        message: format!("{}: {e}", path.display()),
    }
}

fn to_json_line(entity: &TableEntity) -> Result<String, StoreError> {
    let mut obj = Map::new();
    obj.insert("PartitionKey".into(), entity.partition_key.clone().into());
    obj.insert("RowKey".into(), entity.row_key.clone().into());
    obj.insert("Timestamp".into(), chrono::Utc::now().to_rfc3339().into());
    for (name, value) in &entity.properties {
        let v = serde_json::to_value(value).map_err(|e| StoreError::Other {
            status: None,
            message: format!("failed to encode property '{name}': {e}"),
        })?;
        obj.insert(name.clone(), v);
    }
    Ok(JsonValue::Object(obj).to_string())
}

#[async_trait]
impl TableStore for LocalTableStore {
    async fn ensure_table_exists(&self, table: &str) -> Result<(), StoreError> {
        validate_table_name(table)?;
        let mut keys = self.keys.lock().await;
        if keys.contains_key(table) {
            return Ok(());
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| io_error(&self.root, e))?;
        let path = self.table_path(table);
        let loaded = self.load_keys(&path).await?;
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;

        keys.insert(table.to_string(), loaded);
        Ok(())
    }

    async fn execute_batch(&self, table: &str, batch: &BatchUnit) -> Result<(), StoreError> {
        validate_batch(batch)?;

        let mut keys = self.keys.lock().await;
        let existing = keys.get_mut(table).ok_or_else(|| StoreError::Other {
            status: Some(404),
            message: format!("table '{table}' not found"),
        })?;

        let mut buf = String::new();
        for op in &batch.operations {
            let e = op.entity();
            if existing.contains(&(e.partition_key.clone(), e.row_key.clone())) {
                return Err(StoreError::Conflict {
                    message: format!("entity ({}, {}) already exists", e.partition_key, e.row_key),
                });
            }
            buf.push_str(&to_json_line(e)?);
            buf.push('\n');
        }

        let path = self.table_path(table);
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_error(&path, e))?;
        file.write_all(buf.as_bytes()).await.map_err(|e| io_error(&path, e))?;
        file.flush().await.map_err(|e| io_error(&path, e))?;

        for op in &batch.operations {
            let e = op.entity();
            existing.insert((e.partition_key.clone(), e.row_key.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BatchOperation, Value};

    fn batch(pk: &str, rows: &[&str]) -> BatchUnit {
        BatchUnit {
            partition_key: pk.to_string(),
            operations: rows
                .iter()
                .map(|rk| {
                    BatchOperation::insert(TableEntity {
                        partition_key: pk.to_string(),
                        row_key: rk.to_string(),
                        properties: vec![("Year".to_string(), Value::Int32(2016))],
                    })
                    .unwrap()
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn writes_one_line_per_entity() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalTableStore::new(dir.path());
        store.ensure_table_exists("flights").await.unwrap();
        store.execute_batch("flights", &batch("JFK", &["a", "b"])).await.unwrap();

        let text = std::fs::read_to_string(store.table_path("flights")).unwrap();
        let lines: Vec<JsonValue> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["PartitionKey"], "JFK");
        assert_eq!(lines[1]["RowKey"], "b");
        assert_eq!(lines[1]["Year"], 2016);
    }

    #[tokio::test]
    async fn existing_keys_conflict_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalTableStore::new(dir.path());
            store.ensure_table_exists("flights").await.unwrap();
            store.execute_batch("flights", &batch("JFK", &["a"])).await.unwrap();
        }

        let reopened = LocalTableStore::new(dir.path());
        reopened.ensure_table_exists("flights").await.unwrap();
        let err = reopened
            .execute_batch("flights", &batch("JFK", &["z", "a"]))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let text = std::fs::read_to_string(reopened.table_path("flights")).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[tokio::test]
    async fn batch_before_ensure_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalTableStore::new(dir.path());
        let err = store.execute_batch("flights", &batch("JFK", &["a"])).await.unwrap_err();
        assert!(matches!(err, StoreError::Other { status: Some(404), .. }));
    }
}
