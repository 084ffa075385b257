//! Partition grouping.

use std::collections::HashMap;

use crate::record::TableRecord;
use crate::types::PartitionGroup;

/// Group records by partition key.
///
/// Groups are returned in the order their key was first seen, and records keep their input
/// order within a group.
pub fn group_by_partition<R: TableRecord>(records: Vec<R>) -> Vec<PartitionGroup<R>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<PartitionGroup<R>> = Vec::new();

    for record in records {
        match index.get(record.partition_key()) {
            Some(&i) => groups[i].records.push(record),
            None => {
                let key = record.partition_key().to_owned();
                index.insert(key.clone(), groups.len());
                groups.push(PartitionGroup {
                    partition_key: key,
                    records: vec![record],
                });
            }
        }
    }

    groups
}
