//! Splitting partition groups into bounded batch units.

use tracing::warn;

use crate::error::EntityError;
use crate::record::TableRecord;
use crate::types::{BatchOperation, BatchUnit, PartitionGroup};

/// A record whose insert operation could not be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOperation {
    pub partition_key: String,
    pub row_key: String,
    pub reason: EntityError,
}

/// Batches produced from one partition group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkedGroup {
    /// Batches in production order; each holds at most `batch_size` operations.
    pub batches: Vec<BatchUnit>,
    pub skipped: Vec<SkippedOperation>,
}

/// Split a group into `ceil(len / batch_size)` batches, preserving record order.
///
/// Records whose entity fails validation are skipped without affecting the rest of the
/// group. A chunk left empty by skipping produces no batch.
///
/// # Panics
///
/// Panics if `batch_size == 0`.
pub fn chunk_group<R: TableRecord>(group: PartitionGroup<R>, batch_size: usize) -> ChunkedGroup {
    assert!(batch_size > 0, "batch_size must be > 0");

    let PartitionGroup {
        partition_key,
        records,
    } = group;
    let mut out = ChunkedGroup {
        batches: Vec::with_capacity(records.len().div_ceil(batch_size)),
        skipped: Vec::new(),
    };

    let mut records = records.into_iter().peekable();
    while records.peek().is_some() {
        let mut operations = Vec::with_capacity(batch_size);
        for record in records.by_ref().take(batch_size) {
            let entity = record.into_entity();
            let row_key = entity.row_key.clone();
            match BatchOperation::insert(entity) {
                Ok(op) => operations.push(op),
                Err(reason) => {
                    warn!(partition_key = %partition_key, row_key = %row_key, %reason, "skipping insert");
                    out.skipped.push(SkippedOperation {
                        partition_key: partition_key.clone(),
                        row_key,
                        reason,
                    });
                }
            }
        }
        if !operations.is_empty() {
            out.batches.push(BatchUnit {
                partition_key: partition_key.clone(),
                operations,
            });
        }
    }

    out
}
