//! Job orchestration: walks the definition's transition table node by
//! node, fans out splits and partitions, and finalizes the execution
//! record.
//!
//! The orchestrator itself is single-threaded logic; it blocks on the
//! join barrier of every fan-out before proceeding. Blocking step work
//! runs on the tokio blocking pool.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use chunkflow_state::ExecutionStore;
use chunkflow_types::{
    BatchFailure, BatchStatus, ExecutionId, ExitStatus, JobExecution, StepExecution,
};
use tokio::task::JoinSet;

use crate::errors::EngineError;
use crate::flow::{Flow, FlowNode, JobDefinition, Outcome, Transition};
use crate::listener::JobListener;
use crate::partition::PartitionedStep;
use crate::step::{Step, StepScope, StopToken};

pub(crate) struct JobRunner<'a> {
    pub job: &'a JobDefinition,
    pub store: Arc<dyn ExecutionStore>,
    pub listeners: Arc<Vec<Arc<dyn JobListener>>>,
    pub stop: StopToken,
    /// Steps of the instance's previous execution, for restart skips
    /// and context seeding.
    pub prior_steps: Arc<HashMap<String, StepExecution>>,
}

impl JobRunner<'_> {
    pub(crate) async fn run(
        self,
        mut execution: JobExecution,
    ) -> Result<JobExecution, EngineError> {
        execution.start_time = Some(Utc::now());
        self.store.update_job_execution(&execution)?;
        for listener in self.listeners.iter() {
            listener.before_job(&execution);
        }
        execution.transition(BatchStatus::Started);
        self.store.update_job_execution(&execution)?;

        match self.walk(&mut execution).await {
            Ok(terminal) => {
                self.finalize(&mut execution, terminal)?;
                Ok(execution)
            }
            Err(error) => {
                execution.record_failure(BatchFailure::new("fatal", error.to_string()));
                // Best effort: the record must reflect the failure even
                // when the error propagates.
                let _ = self.finalize(&mut execution, BatchStatus::Failed);
                Err(error)
            }
        }
    }

    async fn walk(&self, execution: &mut JobExecution) -> Result<BatchStatus, EngineError> {
        let mut current = self.job.start();
        let mut last_step: Option<usize> = None;

        loop {
            if self.stop.is_stop_requested() {
                tracing::info!(job = execution.job_name, "Stop observed between nodes");
                return Ok(BatchStatus::Stopped);
            }

            let node = self.job.node(current);
            let outcome = match node {
                FlowNode::Step(step) => {
                    match self.run_step(step.clone(), execution).await? {
                        Some(index) => {
                            last_step = Some(index);
                            Outcome::from_status(execution.steps[index].status)
                        }
                        None => Outcome::completed(),
                    }
                }
                FlowNode::Partitioned(step) => {
                    match self.run_partitioned(step.clone(), execution).await? {
                        Some(index) => {
                            last_step = Some(index);
                            Outcome::from_status(execution.steps[index].status)
                        }
                        None => Outcome::completed(),
                    }
                }
                FlowNode::Decision { name, decider } => {
                    let snapshot = last_step.and_then(|index| execution.steps.get(index));
                    let outcome = decider(execution, snapshot);
                    tracing::info!(
                        job = execution.job_name,
                        decision = name,
                        outcome = %outcome,
                        "Decision evaluated"
                    );
                    outcome
                }
                FlowNode::Split { name, flows } => {
                    self.run_split(name, flows, execution).await?
                }
            };

            match self.job.transition_for(current, &outcome) {
                Some(Transition::To(next)) => current = next,
                Some(Transition::End(status)) => return Ok(status),
                None => {
                    // Unmapped failure outcomes end the job; anything
                    // else is a wiring defect.
                    if outcome == Outcome::failed() {
                        return Ok(BatchStatus::Failed);
                    }
                    if outcome == Outcome::stopped() {
                        return Ok(BatchStatus::Stopped);
                    }
                    return Err(EngineError::Infrastructure(anyhow::anyhow!(
                        "no transition from node '{}' on outcome '{}'",
                        node.name(),
                        outcome
                    )));
                }
            }
        }
    }

    /// Run one plain step node. Returns the index of the appended step
    /// execution, or `None` when the step was skipped on restart.
    async fn run_step(
        &self,
        step: Arc<dyn Step>,
        execution: &mut JobExecution,
    ) -> Result<Option<usize>, EngineError> {
        let Some(step_execution) = execute_step(
            step,
            execution.id,
            self.store.clone(),
            self.stop.clone(),
            self.listeners.clone(),
            self.prior_steps.clone(),
        )
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(append_step(execution, step_execution)))
    }

    async fn run_partitioned(
        &self,
        step: Arc<PartitionedStep>,
        execution: &mut JobExecution,
    ) -> Result<Option<usize>, EngineError> {
        if let Some(prior) = self.prior_steps.get(step.name()) {
            if prior.status.is_success() && !step.allow_start_if_complete() {
                tracing::info!(
                    step = step.name(),
                    "Step already complete in prior execution, skipping"
                );
                return Ok(None);
            }
        }

        let mut parent = self
            .store
            .create_step_execution(execution.id, step.name())?;
        for listener in self.listeners.iter() {
            listener.before_step(&mut parent);
        }
        let scope = StepScope {
            store: self.store.clone(),
            stop: self.stop.clone(),
        };
        step.execute(&mut parent, &scope).await?;
        for listener in self.listeners.iter() {
            listener.after_step(&mut parent);
        }
        self.store.update_step_execution(&parent)?;

        Ok(Some(append_step(execution, parent)))
    }

    /// Run a parallel split: every flow fans out, the join barrier
    /// waits for all of them, and the outcomes merge with failure
    /// taking precedence. Sibling flows already running are left to
    /// finish after a failure; no new node starts past the join.
    async fn run_split(
        &self,
        name: &str,
        flows: &[Flow],
        execution: &mut JobExecution,
    ) -> Result<Outcome, EngineError> {
        tracing::info!(
            job = execution.job_name,
            split = name,
            flows = flows.len(),
            "Starting split"
        );

        let mut join_set: JoinSet<Result<(Vec<StepExecution>, BatchStatus), EngineError>> =
            JoinSet::new();
        for flow in flows {
            let flow = flow.clone();
            let store = self.store.clone();
            let stop = self.stop.clone();
            let listeners = self.listeners.clone();
            let prior_steps = self.prior_steps.clone();
            let job_execution_id = execution.id;

            join_set.spawn(async move {
                let mut steps = Vec::new();
                let mut flow_status = BatchStatus::Completed;
                for step in flow.steps {
                    if stop.is_stop_requested() {
                        flow_status = BatchStatus::Stopped;
                        break;
                    }
                    let Some(step_execution) = execute_step(
                        step,
                        job_execution_id,
                        store.clone(),
                        stop.clone(),
                        listeners.clone(),
                        prior_steps.clone(),
                    )
                    .await?
                    else {
                        continue;
                    };
                    let status = step_execution.status;
                    steps.push(step_execution);
                    if status != BatchStatus::Completed {
                        flow_status = status;
                        break;
                    }
                }
                Ok((steps, flow_status))
            });
        }

        let mut any_failed = false;
        let mut any_stopped = false;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok((steps, flow_status))) => {
                    for step_execution in steps {
                        append_step(execution, step_execution);
                    }
                    match flow_status {
                        BatchStatus::Failed => any_failed = true,
                        BatchStatus::Stopped => any_stopped = true,
                        _ => {}
                    }
                }
                Ok(Err(error)) => {
                    any_failed = true;
                    execution.record_failure(BatchFailure::new("fatal", error.to_string()));
                }
                Err(join_err) => {
                    any_failed = true;
                    execution.record_failure(BatchFailure::new(
                        "fatal",
                        format!("split flow panicked: {join_err}"),
                    ));
                }
            }
        }

        let outcome = if any_failed {
            Outcome::failed()
        } else if any_stopped {
            Outcome::stopped()
        } else {
            Outcome::completed()
        };
        tracing::info!(split = name, outcome = %outcome, "Split joined");
        Ok(outcome)
    }

    fn finalize(
        &self,
        execution: &mut JobExecution,
        terminal: BatchStatus,
    ) -> Result<(), EngineError> {
        execution.transition(terminal);
        let description = execution
            .failures
            .first()
            .map(ToString::to_string)
            .unwrap_or_default();
        execution.exit_status = ExitStatus::from_status(execution.status, &description);
        execution.end_time = Some(Utc::now());
        self.store.update_job_execution(execution)?;
        for listener in self.listeners.iter() {
            listener.after_job(execution);
        }
        Ok(())
    }
}

/// Append a finished step to the job execution, propagating a fatal
/// step failure into the job's failure list.
fn append_step(execution: &mut JobExecution, step_execution: StepExecution) -> usize {
    if step_execution.status == BatchStatus::Failed {
        if let Some(failure) = step_execution.failures.last() {
            execution.record_failure(failure.clone());
        }
    }
    execution.steps.push(step_execution);
    execution.steps.len() - 1
}

/// Create, notify, and execute one step on the blocking pool.
///
/// Returns `None` when the step completed in the instance's prior
/// execution and does not allow re-running; a re-run step is seeded
/// with its prior persisted context so readers can resume.
async fn execute_step(
    step: Arc<dyn Step>,
    job_execution_id: ExecutionId,
    store: Arc<dyn ExecutionStore>,
    stop: StopToken,
    listeners: Arc<Vec<Arc<dyn JobListener>>>,
    prior_steps: Arc<HashMap<String, StepExecution>>,
) -> Result<Option<StepExecution>, EngineError> {
    if let Some(prior) = prior_steps.get(step.name()) {
        if prior.status.is_success() && !step.allow_start_if_complete() {
            tracing::info!(
                step = step.name(),
                "Step already complete in prior execution, skipping"
            );
            return Ok(None);
        }
    }

    let mut step_execution = store.create_step_execution(job_execution_id, step.name())?;
    if let Some(prior) = prior_steps.get(step.name()) {
        if !prior.status.is_success() {
            step_execution.context.merge(&prior.context);
        }
    }

    for listener in listeners.iter() {
        listener.before_step(&mut step_execution);
    }

    let scope = StepScope {
        store: store.clone(),
        stop,
    };
    let (mut step_execution, result) = tokio::task::spawn_blocking(move || {
        let result = step.execute(&mut step_execution, &scope);
        (step_execution, result)
    })
    .await
    .map_err(|e| EngineError::Infrastructure(anyhow::anyhow!("step task panicked: {e}")))?;
    result?;

    for listener in listeners.iter() {
        listener.after_step(&mut step_execution);
    }
    store.update_step_execution(&step_execution)?;
    Ok(Some(step_execution))
}
