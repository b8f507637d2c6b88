//! Single-shot tasklet steps.
//!
//! For work that is one unit rather than a stream of items (cleanup,
//! validation passes, notifications). The closure runs once; a
//! classified failure fails the step with the detail recorded.

use chrono::Utc;
use chunkflow_state::ExecutionStore;
use chunkflow_types::{BatchFailure, BatchStatus, ExitStatus, ItemError, StepExecution};

use crate::errors::EngineError;
use crate::step::{Step, StepScope};

type Tasklet = Box<dyn Fn(&mut StepExecution) -> Result<(), ItemError> + Send + Sync>;

pub struct TaskletStep {
    name: String,
    allow_start_if_complete: bool,
    tasklet: Tasklet,
}

impl TaskletStep {
    pub fn new(
        name: impl Into<String>,
        tasklet: impl Fn(&mut StepExecution) -> Result<(), ItemError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            allow_start_if_complete: false,
            tasklet: Box::new(tasklet),
        }
    }

    #[must_use]
    pub fn with_allow_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }
}

impl Step for TaskletStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn allow_start_if_complete(&self) -> bool {
        self.allow_start_if_complete
    }

    fn execute(
        &self,
        execution: &mut StepExecution,
        scope: &StepScope,
    ) -> Result<(), EngineError> {
        execution.start_time = Some(Utc::now());
        execution.transition(BatchStatus::Started);
        scope.store.update_step_execution(execution)?;

        match (self.tasklet)(execution) {
            Ok(()) => {
                execution.transition(BatchStatus::Completed);
                execution.exit_status = ExitStatus::completed();
            }
            Err(err) => {
                execution.record_failure(BatchFailure::new(
                    err.class.to_string(),
                    format!("{}: {}", err.code, err.message),
                ));
                execution.transition(BatchStatus::Failed);
                execution.exit_status = ExitStatus::failed(err.to_string());
                tracing::error!(step = execution.step_name, error = %err, "Tasklet failed");
            }
        }
        execution.end_time = Some(Utc::now());
        scope.store.update_step_execution(execution)?;
        Ok(())
    }
}
