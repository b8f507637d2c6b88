//! Job and step execution records.
//!
//! One [`JobExecution`] is created per launch attempt of a job
//! instance; one [`StepExecution`] is created each time the
//! orchestrator enters a step. Both are persisted by the execution
//! store after every chunk and every step transition, and finalized
//! (made immutable) once terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::params::{ExecutionId, JobInstanceId, JobParameters};
use crate::status::{BatchStatus, ExitStatus};

/// A recorded failure: the fault kind plus a diagnostic message.
///
/// Terminal `failed` executions always carry at least one of these so
/// the cause can be diagnosed without re-running the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub kind: String,
    pub message: String,
}

impl BatchFailure {
    #[must_use]
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// One run attempt of a job instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: ExecutionId,
    pub instance_id: JobInstanceId,
    pub job_name: String,
    pub parameters: JobParameters,
    pub status: BatchStatus,
    pub exit_status: ExitStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub failures: Vec<BatchFailure>,
    pub context: ExecutionContext,
    pub steps: Vec<StepExecution>,
}

impl JobExecution {
    /// Apply a monotonic status transition.
    pub fn transition(&mut self, next: BatchStatus) {
        self.status = self.status.upgraded_to(next);
    }

    pub fn record_failure(&mut self, failure: BatchFailure) {
        self.failures.push(failure);
    }

    /// Sum of a counter over every step, for summary reporting.
    #[must_use]
    pub fn total_read_count(&self) -> u64 {
        self.steps.iter().map(|s| s.read_count).sum()
    }

    #[must_use]
    pub fn total_write_count(&self) -> u64 {
        self.steps.iter().map(|s| s.write_count).sum()
    }

    #[must_use]
    pub fn total_skip_count(&self) -> u64 {
        self.steps.iter().map(|s| s.skip_count).sum()
    }

    /// Wall-clock duration, once both timestamps are set.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// One step's run within a job execution.
///
/// Counters are monotonically non-decreasing within the execution and
/// advance atomically per chunk commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    pub id: ExecutionId,
    pub job_execution_id: ExecutionId,
    pub step_name: String,
    pub status: BatchStatus,
    pub exit_status: ExitStatus,
    pub read_count: u64,
    pub write_count: u64,
    pub filter_count: u64,
    pub skip_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub failures: Vec<BatchFailure>,
    pub context: ExecutionContext,
}

impl StepExecution {
    /// Apply a monotonic status transition.
    pub fn transition(&mut self, next: BatchStatus) {
        self.status = self.status.upgraded_to(next);
    }

    pub fn record_failure(&mut self, failure: BatchFailure) {
        self.failures.push(failure);
    }

    /// Fold a finished partition's counters and failures into this
    /// (parent) step execution.
    pub fn absorb(&mut self, child: &StepExecution) {
        self.read_count += child.read_count;
        self.write_count += child.write_count;
        self.filter_count += child.filter_count;
        self.skip_count += child.skip_count;
        self.commit_count += child.commit_count;
        self.rollback_count += child.rollback_count;
        self.failures.extend(child.failures.iter().cloned());
    }
}

/// One page of a job execution listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPage {
    pub content: Vec<JobExecution>,
    pub total_elements: u64,
    pub total_pages: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str) -> StepExecution {
        StepExecution {
            id: ExecutionId::new(1),
            job_execution_id: ExecutionId::new(1),
            step_name: name.to_string(),
            status: BatchStatus::Starting,
            exit_status: ExitStatus::unknown(),
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            skip_count: 0,
            commit_count: 0,
            rollback_count: 0,
            start_time: None,
            end_time: None,
            failures: Vec::new(),
            context: ExecutionContext::new(),
        }
    }

    #[test]
    fn step_transition_is_monotonic() {
        let mut se = step("load");
        se.transition(BatchStatus::Started);
        se.transition(BatchStatus::Failed);
        se.transition(BatchStatus::Completed);
        assert_eq!(se.status, BatchStatus::Failed);
    }

    #[test]
    fn absorb_sums_counters_and_failures() {
        let mut parent = step("partitioned");
        let mut child = step("partitioned:partition0");
        child.read_count = 10;
        child.write_count = 8;
        child.skip_count = 2;
        child.commit_count = 1;
        child.record_failure(BatchFailure::new("skippable", "bad row"));

        let mut other = step("partitioned:partition1");
        other.read_count = 5;
        other.write_count = 5;
        other.commit_count = 1;

        parent.absorb(&child);
        parent.absorb(&other);
        assert_eq!(parent.read_count, 15);
        assert_eq!(parent.write_count, 13);
        assert_eq!(parent.skip_count, 2);
        assert_eq!(parent.commit_count, 2);
        assert_eq!(parent.failures.len(), 1);
    }

    #[test]
    fn job_totals_sum_over_steps() {
        let mut job = JobExecution {
            id: ExecutionId::new(1),
            instance_id: JobInstanceId::new(1),
            job_name: "import".to_string(),
            parameters: JobParameters::new(),
            status: BatchStatus::Starting,
            exit_status: ExitStatus::unknown(),
            start_time: None,
            end_time: None,
            failures: Vec::new(),
            context: ExecutionContext::new(),
            steps: Vec::new(),
        };
        let mut a = step("a");
        a.read_count = 25;
        a.write_count = 25;
        let mut b = step("b");
        b.read_count = 10;
        b.write_count = 7;
        b.skip_count = 3;
        job.steps.push(a);
        job.steps.push(b);

        assert_eq!(job.total_read_count(), 35);
        assert_eq!(job.total_write_count(), 32);
        assert_eq!(job.total_skip_count(), 3);
    }

    #[test]
    fn failure_display_includes_kind() {
        let f = BatchFailure::new("fatal", "sink unavailable");
        assert_eq!(f.to_string(), "[fatal] sink unavailable");
    }
}
