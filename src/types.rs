//! Core data model types for loading.
//!
//! Input files are described by a [`Schema`] (a list of typed [`Field`]s). Parsed records are
//! turned into [`TableEntity`] values, grouped into [`PartitionGroup`]s and submitted to the
//! store as [`BatchUnit`]s.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::EntityError;

/// Hard upper bound on operations in one store batch.
pub const MAX_BATCH_SIZE: usize = 100;

/// Largest partition/row key the store accepts, in bytes.
pub const MAX_KEY_BYTES: usize = 1024;

/// Largest number of user properties on one entity.
pub const MAX_PROPERTIES: usize = 252;

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 32-bit signed integer.
    Int32,
    /// UTF-8 string.
    Utf8,
    /// Calendar date without a time zone.
    Date,
}

/// A single named, typed column in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Column name, also used as the entity property name.
    pub name: String,
    /// Column data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered column layout of an input file, plus the column the partition key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields. Only this many leading columns are read from each line.
    pub fields: Vec<Field>,
    /// Index into `fields` of the partition key column.
    pub partition_column: usize,
}

impl Schema {
    /// Create a new schema.
    ///
    /// # Panics
    ///
    /// Panics if `partition_column` is out of range.
    pub fn new(fields: Vec<Field>, partition_column: usize) -> Self {
        assert!(
            partition_column < fields.len(),
            "partition column {partition_column} out of range for {} fields",
            fields.len()
        );
        Self {
            fields,
            partition_column,
        }
    }

    /// Number of columns consumed from each line.
    pub fn width(&self) -> usize {
        self.fields.len()
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Name of the partition key column.
    pub fn partition_field(&self) -> &Field {
        &self.fields[self.partition_column]
    }
}

/// A single typed property value on a [`TableEntity`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 32-bit signed integer.
    Int32(i32),
    /// UTF-8 string.
    Utf8(String),
    /// Calendar date, serialized as `YYYY-MM-DD`.
    Date(NaiveDate),
}

/// What the store receives for one row: keys plus typed properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableEntity {
    pub partition_key: String,
    pub row_key: String,
    pub properties: Vec<(String, Value)>,
}

impl TableEntity {
    /// Check the entity against the store's structural rules.
    pub fn validate(&self) -> Result<(), EntityError> {
        validate_key("partition key", &self.partition_key)?;
        validate_key("row key", &self.row_key)?;
        if self.properties.len() > MAX_PROPERTIES {
            return Err(EntityError::TooManyProperties {
                count: self.properties.len(),
                limit: MAX_PROPERTIES,
            });
        }
        Ok(())
    }

    /// Look up a property by name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

fn validate_key(key: &'static str, value: &str) -> Result<(), EntityError> {
    let invalid = |reason: String| EntityError::InvalidKey {
        key,
        value: value.to_owned(),
        reason,
    };

    if value.is_empty() {
        return Err(invalid("must not be empty".to_string()));
    }
    if value.len() > MAX_KEY_BYTES {
        return Err(invalid(format!(
            "{} bytes exceeds the {MAX_KEY_BYTES} byte limit",
            value.len()
        )));
    }
    if let Some(c) = value
        .chars()
        .find(|c| matches!(c, '/' | '\\' | '#' | '?') || c.is_control())
    {
        return Err(invalid(format!("disallowed character {c:?}")));
    }
    Ok(())
}

/// A single operation inside a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOperation {
    /// Insert a new entity; fails with a conflict if the full key already exists.
    Insert(TableEntity),
}

impl BatchOperation {
    /// Build an insert operation, rejecting structurally invalid entities.
    pub fn insert(entity: TableEntity) -> Result<Self, EntityError> {
        entity.validate()?;
        Ok(BatchOperation::Insert(entity))
    }

    /// The entity this operation writes.
    pub fn entity(&self) -> &TableEntity {
        match self {
            BatchOperation::Insert(e) => e,
        }
    }
}

/// Records sharing one partition key, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionGroup<R> {
    pub partition_key: String,
    pub records: Vec<R>,
}

impl<R> PartitionGroup<R> {
    /// Number of records in the group.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if the group holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// One atomic store transaction: at most [`MAX_BATCH_SIZE`] inserts on a single partition.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchUnit {
    pub partition_key: String,
    pub operations: Vec<BatchOperation>,
}

impl BatchUnit {
    /// Number of operations in the batch.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Row keys in operation order.
    pub fn row_keys(&self) -> impl Iterator<Item = &str> {
        self.operations.iter().map(|op| op.entity().row_key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(pk: &str, rk: &str) -> TableEntity {
        TableEntity {
            partition_key: pk.to_string(),
            row_key: rk.to_string(),
            properties: vec![("Origin".to_string(), Value::Utf8(pk.to_string()))],
        }
    }

    #[test]
    fn insert_accepts_plain_keys() {
        let op = BatchOperation::insert(entity("JFK", "a1")).unwrap();
        assert_eq!(op.entity().partition_key, "JFK");
    }

    #[test]
    fn insert_rejects_disallowed_key_characters() {
        for bad in ["JF/K", "JF\\K", "J#FK", "JFK?", "JF\u{7}K"] {
            let err = BatchOperation::insert(entity(bad, "a1")).unwrap_err();
            assert!(matches!(err, EntityError::InvalidKey { key: "partition key", .. }), "{bad:?}");
        }
    }

    #[test]
    fn insert_rejects_oversized_row_key() {
        let long = "x".repeat(MAX_KEY_BYTES + 1);
        let err = BatchOperation::insert(entity("JFK", &long)).unwrap_err();
        assert!(err.to_string().contains("row key"));
    }

    #[test]
    fn insert_rejects_too_many_properties() {
        let mut e = entity("JFK", "a1");
        e.properties = (0..=MAX_PROPERTIES)
            .map(|i| (format!("p{i}"), Value::Int32(i as i32)))
            .collect();
        let err = BatchOperation::insert(e).unwrap_err();
        assert_eq!(
            err,
            EntityError::TooManyProperties {
                count: MAX_PROPERTIES + 1,
                limit: MAX_PROPERTIES
            }
        );
    }

    #[test]
    fn value_serializes_untagged() {
        let date = NaiveDate::from_ymd_opt(2016, 1, 6).unwrap();
        let json = serde_json::to_string(&vec![
            Value::Null,
            Value::Int32(7),
            Value::Utf8("AA".to_string()),
            Value::Date(date),
        ])
        .unwrap();
        assert_eq!(json, r#"[null,7,"AA","2016-01-06"]"#);
    }
}
