//! Lifecycle listeners.
//!
//! Listeners are notified in order — `before_job`, `before_step` per
//! step, `after_step` per step, `after_job` — and are observation
//! only: they may annotate a step's context but must not affect engine
//! decisions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use chunkflow_types::{JobExecution, StepExecution};

/// Observer of job and step lifecycle events.
pub trait JobListener: Send + Sync {
    fn before_job(&self, _execution: &JobExecution) {}
    fn before_step(&self, _execution: &mut StepExecution) {}
    fn after_step(&self, _execution: &mut StepExecution) {}
    fn after_job(&self, _execution: &JobExecution) {}
}

/// Records per-step wall-clock time into the step's context.
///
/// The timer taken at `before_step` is held in the listener and
/// consumed at `after_step`; the elapsed time lands in the context
/// under `processing.time`.
#[derive(Default)]
pub struct TimingListener {
    inflight: Mutex<HashMap<i64, Instant>>,
}

impl TimingListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobListener for TimingListener {
    fn before_step(&self, execution: &mut StepExecution) {
        if let Ok(mut inflight) = self.inflight.lock() {
            inflight.insert(execution.id.value(), Instant::now());
        }
    }

    fn after_step(&self, execution: &mut StepExecution) {
        let started = match self.inflight.lock() {
            Ok(mut inflight) => inflight.remove(&execution.id.value()),
            Err(_) => None,
        };
        if let Some(started) = started {
            let elapsed = started.elapsed();
            execution
                .context
                .put_string("processing.time", format!("{:.3}s", elapsed.as_secs_f64()));
        }
    }
}

/// Logs a start line and a completion summary for every job run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryListener;

impl JobListener for SummaryListener {
    fn before_job(&self, execution: &JobExecution) {
        tracing::info!(
            job = execution.job_name,
            execution_id = %execution.id,
            parameters = execution.parameters.len(),
            "Job started"
        );
    }

    #[allow(clippy::cast_precision_loss)]
    fn after_job(&self, execution: &JobExecution) {
        let duration_secs = execution
            .duration()
            .map(|d| d.num_milliseconds() as f64 / 1_000.0)
            .unwrap_or_default();
        tracing::info!(
            job = execution.job_name,
            execution_id = %execution.id,
            status = %execution.status,
            duration_secs,
            read_count = execution.total_read_count(),
            write_count = execution.total_write_count(),
            skip_count = execution.total_skip_count(),
            "Job finished"
        );
        for failure in &execution.failures {
            tracing::error!(
                job = execution.job_name,
                kind = failure.kind,
                "Job failure: {}",
                failure.message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkflow_types::{
        BatchStatus, ExecutionContext, ExecutionId, ExitStatus, JobInstanceId, JobParameters,
    };

    fn step_execution(id: i64) -> StepExecution {
        StepExecution {
            id: ExecutionId::new(id),
            job_execution_id: ExecutionId::new(1),
            step_name: "load".to_string(),
            status: BatchStatus::Started,
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
    fn timing_listener_writes_processing_time() {
        let listener = TimingListener::new();
        let mut execution = step_execution(7);

        listener.before_step(&mut execution);
        listener.after_step(&mut execution);

        let recorded = execution.context.get_string("processing.time").unwrap();
        assert!(recorded.ends_with('s'), "got: {recorded}");
    }

    #[test]
    fn after_step_without_before_is_harmless() {
        let listener = TimingListener::new();
        let mut execution = step_execution(8);
        listener.after_step(&mut execution);
        assert!(execution.context.get_string("processing.time").is_none());
    }

    #[test]
    fn concurrent_steps_get_independent_timers() {
        let listener = TimingListener::new();
        let mut first = step_execution(1);
        let mut second = step_execution(2);

        listener.before_step(&mut first);
        listener.before_step(&mut second);
        listener.after_step(&mut first);
        listener.after_step(&mut second);

        assert!(first.context.get_string("processing.time").is_some());
        assert!(second.context.get_string("processing.time").is_some());
    }

    #[test]
    fn summary_listener_tolerates_unfinished_execution() {
        let execution = JobExecution {
            id: ExecutionId::new(1),
            instance_id: JobInstanceId::new(1),
            job_name: "import".to_string(),
            parameters: JobParameters::new(),
            status: BatchStatus::Started,
            exit_status: ExitStatus::unknown(),
            start_time: None,
            end_time: None,
            failures: Vec::new(),
            context: ExecutionContext::new(),
            steps: Vec::new(),
        };
        SummaryListener.before_job(&execution);
        SummaryListener.after_job(&execution);
    }
}
