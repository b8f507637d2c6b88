//! Job launcher: parameter validation, instance identity, and the
//! entry point that drives a job definition to completion.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chunkflow_state::{ExecutionStore, StoreError};
use chunkflow_types::{BatchStatus, ExecutionId, JobExecution, JobParameters, StepExecution};

use crate::errors::LaunchError;
use crate::flow::JobDefinition;
use crate::listener::JobListener;
use crate::orchestrator::JobRunner;
use crate::step::StopToken;

/// Caller-facing view of a launched execution.
#[derive(Debug, Clone)]
pub struct JobExecutionHandle {
    pub id: ExecutionId,
    pub job_name: String,
    pub status: BatchStatus,
    pub start_time: Option<DateTime<Utc>>,
}

impl From<&JobExecution> for JobExecutionHandle {
    fn from(execution: &JobExecution) -> Self {
        Self {
            id: execution.id,
            job_name: execution.job_name.clone(),
            status: execution.status,
            start_time: execution.start_time,
        }
    }
}

/// Validates parameters, establishes job-instance identity, and runs
/// the orchestrator.
pub struct JobLauncher {
    store: Arc<dyn ExecutionStore>,
    listeners: Arc<Vec<Arc<dyn JobListener>>>,
}

impl JobLauncher {
    #[must_use]
    pub fn new(store: Arc<dyn ExecutionStore>) -> Self {
        Self {
            store,
            listeners: Arc::new(Vec::new()),
        }
    }

    /// Register a lifecycle listener. Listeners are notified in
    /// registration order.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        Arc::make_mut(&mut self.listeners).push(listener);
        self
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn ExecutionStore> {
        self.store.clone()
    }

    /// Launch a job and drive it to a terminal status.
    ///
    /// # Errors
    ///
    /// Fails with [`LaunchError::InvalidParameters`] when required
    /// parameters are missing, [`LaunchError::DuplicateInstance`] when
    /// an identical-parameter instance already completed, or a state/
    /// engine error.
    pub async fn launch(
        &self,
        job: &JobDefinition,
        parameters: JobParameters,
    ) -> Result<JobExecutionHandle, LaunchError> {
        self.launch_with_stop(job, parameters, StopToken::new())
            .await
    }

    /// Launch with a caller-held stop token; requesting a stop on the
    /// token transitions the run to `Stopped` at the next chunk or
    /// node boundary.
    pub async fn launch_with_stop(
        &self,
        job: &JobDefinition,
        parameters: JobParameters,
        stop: StopToken,
    ) -> Result<JobExecutionHandle, LaunchError> {
        let missing: Vec<String> = job
            .required_parameters()
            .iter()
            .filter(|key| !parameters.contains(key))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(LaunchError::InvalidParameters { missing });
        }

        let prior = self.store.last_execution(job.name(), &parameters)?;
        let execution = self
            .store
            .create_job_execution(job.name(), &parameters, job.restartable_when_complete())
            .map_err(|e| match e {
                StoreError::DuplicateInstance { job_name } => {
                    LaunchError::DuplicateInstance { job_name }
                }
                other => LaunchError::State(other),
            })?;

        tracing::info!(
            job = job.name(),
            execution_id = %execution.id,
            restart = prior.is_some(),
            "Launching job"
        );

        let runner = JobRunner {
            job,
            store: self.store.clone(),
            listeners: self.listeners.clone(),
            stop,
            prior_steps: Arc::new(prior_step_index(prior)),
        };
        let execution = runner.run(execution).await?;
        Ok(JobExecutionHandle::from(&execution))
    }
}

/// Index a prior execution's steps by name for restart decisions.
fn prior_step_index(prior: Option<JobExecution>) -> HashMap<String, StepExecution> {
    let mut index = HashMap::new();
    if let Some(prior) = prior {
        for step in prior.steps {
            // Later runs of the same step name win.
            index.insert(step.step_name.clone(), step);
        }
    }
    index
}
