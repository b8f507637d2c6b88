//! Execution store trait definition.
//!
//! [`ExecutionStore`] defines the storage contract for job instances,
//! job/step executions, counters, and restart contexts. Model types
//! live in `chunkflow-types`.

use chunkflow_types::{ExecutionId, ExecutionPage, JobExecution, JobParameters, StepExecution};

use crate::error;

/// Storage contract for batch execution state.
///
/// Implementations must be `Send + Sync` for use behind
/// `Arc<dyn ExecutionStore>`; concurrent partitions each own their own
/// step execution record, so per-record updates need no cross-worker
/// coordination beyond the store's internal locking.
pub trait ExecutionStore: Send + Sync {
    /// Create a new job execution for `(job_name, parameters)`.
    ///
    /// Finds or creates the job instance identified by the normalized
    /// parameter set. Rejects the launch when the instance's latest
    /// execution is `completed` and `allow_restart` is false.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateInstance`](crate::StoreError) for
    /// a completed instance, or a storage error.
    fn create_job_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
        allow_restart: bool,
    ) -> error::Result<JobExecution>;

    /// Create a step execution attached to a job execution.
    ///
    /// # Errors
    ///
    /// Returns a storage error on failure.
    fn create_step_execution(
        &self,
        job_execution_id: ExecutionId,
        step_name: &str,
    ) -> error::Result<StepExecution>;

    /// Idempotent upsert of a job execution's mutable fields
    /// (status, exit, timestamps, failures, context).
    ///
    /// # Errors
    ///
    /// Returns a storage error on failure.
    fn update_job_execution(&self, execution: &JobExecution) -> error::Result<()>;

    /// Idempotent upsert of a step execution's mutable fields.
    ///
    /// Called after every chunk commit, which is what makes in-flight
    /// counters visible to concurrent queries.
    ///
    /// # Errors
    ///
    /// Returns a storage error on failure.
    fn update_step_execution(&self, execution: &StepExecution) -> error::Result<()>;

    /// Fetch a job execution by id, with its step executions hydrated
    /// in creation order.
    ///
    /// # Errors
    ///
    /// Returns a storage error on failure.
    fn find_execution(&self, id: ExecutionId) -> error::Result<Option<JobExecution>>;

    /// Latest execution (by id) for `(job_name, parameters)`, if any.
    /// Used to anchor restart decisions.
    ///
    /// # Errors
    ///
    /// Returns a storage error on failure.
    fn last_execution(
        &self,
        job_name: &str,
        parameters: &JobParameters,
    ) -> error::Result<Option<JobExecution>>;

    /// Page through executions, newest first, optionally filtered by
    /// job name.
    ///
    /// # Errors
    ///
    /// Returns a storage error on failure.
    fn list_executions(
        &self,
        job_name: Option<&str>,
        page: u64,
        size: u64,
    ) -> error::Result<ExecutionPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn ExecutionStore`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn ExecutionStore) {}
    }
}
