//! In-memory planning: grouping parsed records by partition and chunking them into batches.
//!
//! - [`group_by_partition`]: records → [`crate::types::PartitionGroup`]s
//! - [`chunk_group`]: one group → bounded [`crate::types::BatchUnit`]s
//! - [`BatchPlanner`]: both steps, fanned out across groups on a rayon pool
//!
//! ## Example
//!
//! ```rust
//! use table_loader::processing::{BatchPlanner, PlannerOptions};
//! use table_loader::record::FlightRecord;
//!
//! let planner = BatchPlanner::new(PlannerOptions::default()).unwrap();
//! let plan = planner.plan(Vec::<FlightRecord>::new());
//! assert!(plan.batches.is_empty());
//! ```

pub mod chunk;
pub mod group;

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{LoadError, LoadResult};
use crate::record::TableRecord;
use crate::types::{BatchUnit, MAX_BATCH_SIZE};

pub use chunk::{ChunkedGroup, SkippedOperation, chunk_group};
pub use group::group_by_partition;

/// Configuration for the [`BatchPlanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerOptions {
    /// Operations per batch. Must be in `1..=MAX_BATCH_SIZE`.
    pub batch_size: usize,
    /// Worker threads used to chunk groups.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub num_threads: Option<usize>,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            batch_size: MAX_BATCH_SIZE,
            num_threads: None,
        }
    }
}

/// Batches for one file, grouped by partition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    /// Batches, contiguous per partition and in production order within a partition.
    pub batches: Vec<BatchUnit>,
    pub skipped: Vec<SkippedOperation>,
    /// Number of distinct partition keys.
    pub partitions: usize,
}

/// Groups records and chunks each group into batches in parallel.
pub struct BatchPlanner {
    pool: ThreadPool,
    opts: PlannerOptions,
}

impl BatchPlanner {
    /// Create a planner, validating options and building its thread pool.
    pub fn new(opts: PlannerOptions) -> LoadResult<Self> {
        if opts.batch_size == 0 || opts.batch_size > MAX_BATCH_SIZE {
            return Err(LoadError::InvalidOptions {
                message: format!(
                    "batch_size must be between 1 and {MAX_BATCH_SIZE}, got {}",
                    opts.batch_size
                ),
            });
        }
        if opts.num_threads == Some(0) {
            return Err(LoadError::InvalidOptions {
                message: "num_threads must be > 0 when set".to_string(),
            });
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1));
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("chunker-{i}"))
            .build()
            .map_err(|e| LoadError::InvalidOptions {
                message: format!("failed to build chunking pool: {e}"),
            })?;

        Ok(Self { pool, opts })
    }

    /// Operations per batch.
    pub fn batch_size(&self) -> usize {
        self.opts.batch_size
    }

    /// Group `records` by partition and chunk every group.
    pub fn plan<R: TableRecord>(&self, records: Vec<R>) -> BatchPlan {
        let groups = group_by_partition(records);
        let partitions = groups.len();
        let batch_size = self.opts.batch_size;

        let chunked: Vec<ChunkedGroup> = self.pool.install(|| {
            groups
                .into_par_iter()
                .map(|group| chunk_group(group, batch_size))
                .collect()
        });

        let mut plan = BatchPlan {
            partitions,
            ..Default::default()
        };
        for group in chunked {
            plan.batches.extend(group.batches);
            plan.skipped.extend(group.skipped);
        }
        debug!(
            partitions,
            batches = plan.batches.len(),
            skipped = plan.skipped.len(),
            "planned batches"
        );
        plan
    }
}
