//! Partitioned execution: split a step's domain into disjoint ranges
//! and run one chunk executor per range on a bounded worker pool.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use chunkflow_state::ExecutionStore;
use chunkflow_types::{
    BatchFailure, BatchStatus, ExecutionContext, ExitStatus, StepExecution,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::errors::EngineError;
use crate::step::{Step, StepScope};

/// Context keys seeded into every partition's execution context.
pub const PARTITION_NUMBER_KEY: &str = "partition.number";
pub const RANGE_START_KEY: &str = "range.start";
pub const RANGE_END_KEY: &str = "range.end";

/// Splits a step's input domain into named, disjoint sub-ranges.
pub trait Partitioner: Send + Sync {
    fn partition(&self, grid_size: u32) -> BTreeMap<String, ExecutionContext>;
}

/// Contiguous fixed-span ranges: partition `i` covers
/// `[i*span, (i+1)*span)`.
///
/// The partition count is structural — exactly `grid_size` entries,
/// named `partition0..partition{grid_size-1}`, with no gaps and no
/// overlap.
#[derive(Debug, Clone, Copy)]
pub struct RangePartitioner {
    span: u64,
}

impl Default for RangePartitioner {
    fn default() -> Self {
        Self { span: 1_000 }
    }
}

impl RangePartitioner {
    #[must_use]
    pub fn new(span: u64) -> Self {
        Self { span: span.max(1) }
    }
}

impl Partitioner for RangePartitioner {
    #[allow(clippy::cast_possible_wrap)]
    fn partition(&self, grid_size: u32) -> BTreeMap<String, ExecutionContext> {
        let mut partitions = BTreeMap::new();
        for index in 0..u64::from(grid_size) {
            let start = index * self.span;
            let end = start + self.span;

            let mut context = ExecutionContext::new();
            context.put_int(PARTITION_NUMBER_KEY, index as i64);
            context.put_int(RANGE_START_KEY, start as i64);
            context.put_int(RANGE_END_KEY, end as i64);

            let name = format!("partition{index}");
            tracing::debug!(partition = name, start, end, "Created partition");
            partitions.insert(name, context);
        }
        partitions
    }
}

/// Runs one worker step per partition concurrently and rolls the
/// results up into a parent step execution.
pub struct PartitionedStep {
    name: String,
    worker: Arc<dyn Step>,
    partitioner: Arc<dyn Partitioner>,
    grid_size: u32,
    max_workers: usize,
    allow_start_if_complete: bool,
}

impl PartitionedStep {
    pub fn new(
        name: impl Into<String>,
        worker: Arc<dyn Step>,
        partitioner: Arc<dyn Partitioner>,
    ) -> Self {
        Self {
            name: name.into(),
            worker,
            partitioner,
            grid_size: 4,
            max_workers: 4,
            allow_start_if_complete: false,
        }
    }

    #[must_use]
    pub fn with_grid_size(mut self, grid_size: u32) -> Self {
        self.grid_size = grid_size.max(1);
        self
    }

    #[must_use]
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    #[must_use]
    pub fn with_allow_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn allow_start_if_complete(&self) -> bool {
        self.allow_start_if_complete
    }

    /// Fan out, block on the join barrier, then aggregate.
    ///
    /// Partition failures are isolated: a failed or panicked partition
    /// never prevents collection of its siblings' results, but any
    /// failure marks the parent `Failed` once all partitions finish.
    pub async fn execute(
        &self,
        parent: &mut StepExecution,
        scope: &StepScope,
    ) -> Result<(), EngineError> {
        parent.start_time = Some(Utc::now());
        parent.transition(BatchStatus::Started);
        scope.store.update_step_execution(parent)?;

        let partitions = self.partitioner.partition(self.grid_size);
        tracing::info!(
            step = parent.step_name,
            partitions = partitions.len(),
            max_workers = self.max_workers,
            "Starting partitioned execution"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut join_set: JoinSet<Result<(StepExecution, Result<(), EngineError>), EngineError>> =
            JoinSet::new();

        for (partition_name, partition_context) in partitions {
            let child_name = format!("{}:{partition_name}", self.worker.name());
            let mut child = scope
                .store
                .create_step_execution(parent.job_execution_id, &child_name)?;
            child.context.merge(&partition_context);

            let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                EngineError::Infrastructure(anyhow::anyhow!("worker pool closed: {e}"))
            })?;
            let worker = self.worker.clone();
            let worker_scope = scope.clone();

            join_set.spawn(async move {
                let _permit = permit;
                tokio::task::spawn_blocking(move || {
                    let result = worker.execute(&mut child, &worker_scope);
                    (child, result)
                })
                .await
                .map_err(|e| {
                    EngineError::Infrastructure(anyhow::anyhow!(
                        "partition worker panicked: {e}"
                    ))
                })
            });
        }

        let mut panicked = false;
        let mut children = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok((child, Ok(())))) => children.push(child),
                Ok(Ok((mut child, Err(error)))) => {
                    // Worker hit an infrastructure error; isolate it to
                    // this partition and keep collecting siblings.
                    child.record_failure(BatchFailure::new("fatal", error.to_string()));
                    child.transition(BatchStatus::Failed);
                    child.exit_status = ExitStatus::failed(error.to_string());
                    let _ = scope.store.update_step_execution(&child);
                    children.push(child);
                }
                Ok(Err(error)) => {
                    panicked = true;
                    parent.record_failure(BatchFailure::new("fatal", error.to_string()));
                }
                Err(join_err) => {
                    panicked = true;
                    parent.record_failure(BatchFailure::new(
                        "fatal",
                        format!("partition task panicked: {join_err}"),
                    ));
                }
            }
        }

        let mut any_failed = panicked;
        let mut any_stopped = false;
        for child in &children {
            parent.absorb(child);
            match child.status {
                BatchStatus::Failed => any_failed = true,
                BatchStatus::Stopped => any_stopped = true,
                _ => {}
            }
        }

        let status = if any_failed {
            BatchStatus::Failed
        } else if any_stopped {
            BatchStatus::Stopped
        } else {
            BatchStatus::Completed
        };
        parent.transition(status);
        parent.exit_status = ExitStatus::from_status(
            status,
            parent
                .failures
                .first()
                .map(ToString::to_string)
                .unwrap_or_default()
                .as_str(),
        );
        parent.end_time = Some(Utc::now());
        scope.store.update_step_execution(parent)?;

        tracing::info!(
            step = parent.step_name,
            status = %parent.status,
            read_count = parent.read_count,
            write_count = parent.write_count,
            "Partitioned execution finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_are_exact_and_contiguous() {
        let partitioner = RangePartitioner::default();
        let partitions = partitioner.partition(4);

        assert_eq!(partitions.len(), 4);
        for index in 0..4_i64 {
            let context = &partitions[&format!("partition{index}")];
            assert_eq!(context.get_int(PARTITION_NUMBER_KEY), Some(index));
            assert_eq!(context.get_int(RANGE_START_KEY), Some(index * 1_000));
            assert_eq!(context.get_int(RANGE_END_KEY), Some((index + 1) * 1_000));
        }
    }

    #[test]
    fn ranges_have_no_gaps_or_overlap() {
        let partitioner = RangePartitioner::new(250);
        let partitions = partitioner.partition(8);

        let mut ranges: Vec<(i64, i64)> = partitions
            .values()
            .map(|c| {
                (
                    c.get_int(RANGE_START_KEY).unwrap(),
                    c.get_int(RANGE_END_KEY).unwrap(),
                )
            })
            .collect();
        ranges.sort_unstable();

        assert_eq!(ranges.first().unwrap().0, 0);
        assert_eq!(ranges.last().unwrap().1, 2_000);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
    }

    #[test]
    fn single_partition_covers_one_span() {
        let partitions = RangePartitioner::new(500).partition(1);
        assert_eq!(partitions.len(), 1);
        let context = &partitions["partition0"];
        assert_eq!(context.get_int(RANGE_START_KEY), Some(0));
        assert_eq!(context.get_int(RANGE_END_KEY), Some(500));
    }
}
