//! The chunk-oriented step executor.
//!
//! Repeatedly pulls up to `chunk_size` items from the reader, pushes
//! each through the processor under the fault-tolerance policy,
//! writes the surviving batch as one unit, and persists the step
//! snapshot after every commit. The loop observes stop requests
//! between chunks only, so a chunk is always fully committed or fully
//! rolled back.

use std::sync::Arc;

use chrono::Utc;
use chunkflow_state::ExecutionStore;
use chunkflow_types::{
    BatchFailure, BatchStatus, ExecutionContext, ExitStatus, ItemError, StepExecution,
};

use crate::errors::EngineError;
use crate::item::{ItemProcessor, ItemReader, ItemWriter, Processed};
use crate::policy::{ChunkRecovery, FaultTolerancePolicy, Recovery};
use crate::step::{Step, StepScope};

/// Failure-list kind for validity failures (written but tagged).
pub const DATA_VALIDITY_KIND: &str = "data_validity";

type ReaderFactory<I> =
    Box<dyn Fn(&ExecutionContext) -> Box<dyn ItemReader<I>> + Send + Sync>;

/// A read→process→write step committing in bounded chunks.
pub struct ChunkStep<I, O> {
    name: String,
    chunk_size: usize,
    policy: FaultTolerancePolicy,
    allow_start_if_complete: bool,
    reader_factory: ReaderFactory<I>,
    processor: Arc<dyn ItemProcessor<I, O>>,
    writer: Arc<dyn ItemWriter<O>>,
}

impl<I, O> ChunkStep<I, O> {
    /// Create a step with the default chunk size (10) and policy.
    ///
    /// The reader factory is invoked once per step run with the
    /// restored execution context, so restarts and partitions each get
    /// a fresh reader positioned by their own context.
    pub fn new(
        name: impl Into<String>,
        reader_factory: impl Fn(&ExecutionContext) -> Box<dyn ItemReader<I>> + Send + Sync + 'static,
        processor: Arc<dyn ItemProcessor<I, O>>,
        writer: Arc<dyn ItemWriter<O>>,
    ) -> Self {
        Self {
            name: name.into(),
            chunk_size: 10,
            policy: FaultTolerancePolicy::default(),
            allow_start_if_complete: false,
            reader_factory: Box::new(reader_factory),
            processor,
            writer,
        }
    }

    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FaultTolerancePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_allow_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }

    fn wait(&self, attempt: u32) {
        let delay = self.policy.retry_delay(attempt);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    fn record_skip(execution: &mut StepExecution, error: &ItemError) {
        execution.skip_count += 1;
        execution.record_failure(BatchFailure::new(
            error.class.to_string(),
            format!("{}: {}", error.code, error.message),
        ));
        tracing::warn!(
            step = execution.step_name,
            skip_count = execution.skip_count,
            error = %error,
            "Item skipped"
        );
    }

    /// Fatal failure: roll back the in-flight chunk and fail the step.
    fn abort(
        execution: &mut StepExecution,
        scope: &StepScope,
        error: &ItemError,
    ) -> Result<(), EngineError> {
        execution.rollback_count += 1;
        execution.record_failure(BatchFailure::new(
            error.class.to_string(),
            format!("{}: {}", error.code, error.message),
        ));
        execution.transition(BatchStatus::Failed);
        execution.exit_status = ExitStatus::failed(error.to_string());
        execution.end_time = Some(Utc::now());
        scope.store.update_step_execution(execution)?;
        tracing::error!(
            step = execution.step_name,
            rollback_count = execution.rollback_count,
            error = %error,
            "Step failed, chunk rolled back"
        );
        Ok(())
    }

    /// Fill the next chunk. Returns `true` once the reader is
    /// exhausted; a `None` return means the step aborted.
    fn fill_chunk(
        &self,
        reader: &mut dyn ItemReader<I>,
        execution: &mut StepExecution,
        scope: &StepScope,
        inputs: &mut Vec<I>,
    ) -> Result<Option<bool>, EngineError> {
        let mut attempts = 0u32;
        while inputs.len() < self.chunk_size {
            match reader.read() {
                Ok(Some(item)) => {
                    attempts = 0;
                    execution.read_count += 1;
                    inputs.push(item);
                }
                Ok(None) => return Ok(Some(true)),
                Err(err) => {
                    attempts += 1;
                    match self
                        .policy
                        .on_item_error(&err, attempts, execution.skip_count)
                    {
                        Recovery::Retry => self.wait(attempts),
                        Recovery::Skip => {
                            attempts = 0;
                            Self::record_skip(execution, &err);
                        }
                        Recovery::Abort => {
                            Self::abort(execution, scope, &err)?;
                            return Ok(None);
                        }
                    }
                }
            }
        }
        Ok(Some(false))
    }

    /// Process one chunk's items. A `None` return means the step
    /// aborted.
    fn process_chunk(
        &self,
        inputs: &[I],
        execution: &mut StepExecution,
        scope: &StepScope,
    ) -> Result<Option<Vec<O>>, EngineError> {
        let mut outputs = Vec::with_capacity(inputs.len());
        for item in inputs {
            let mut attempts = 0u32;
            loop {
                match self.processor.process(item) {
                    Ok(Processed::Emit(out)) => outputs.push(out),
                    Ok(Processed::Filtered) => execution.filter_count += 1,
                    Ok(Processed::EmitFailed { item: out, reason }) => {
                        // Written anyway, tagged by the processor:
                        // auditable output, not a skip.
                        outputs.push(out);
                        execution.record_failure(BatchFailure::new(DATA_VALIDITY_KIND, reason));
                    }
                    Err(err) => {
                        attempts += 1;
                        match self
                            .policy
                            .on_item_error(&err, attempts, execution.skip_count)
                        {
                            Recovery::Retry => {
                                self.wait(attempts);
                                continue;
                            }
                            Recovery::Skip => Self::record_skip(execution, &err),
                            Recovery::Abort => {
                                Self::abort(execution, scope, &err)?;
                                return Ok(None);
                            }
                        }
                    }
                }
                break;
            }
        }
        Ok(Some(outputs))
    }

    /// Write one chunk as a unit. A `false` return means the step
    /// aborted.
    #[allow(clippy::cast_possible_truncation)]
    fn write_chunk(
        &self,
        outputs: Vec<O>,
        execution: &mut StepExecution,
        scope: &StepScope,
    ) -> Result<bool, EngineError> {
        let chunk_len = outputs.len() as u64;
        let mut attempts = 0u32;
        loop {
            match self.writer.write(&outputs) {
                Ok(()) => {
                    execution.write_count += chunk_len;
                    execution.commit_count += 1;
                    return Ok(true);
                }
                Err(err) => {
                    attempts += 1;
                    match self.policy.on_chunk_error(
                        &err,
                        attempts,
                        execution.skip_count,
                        chunk_len,
                    ) {
                        ChunkRecovery::Retry => self.wait(attempts),
                        ChunkRecovery::SkipChunk => {
                            execution.rollback_count += 1;
                            execution.skip_count += chunk_len;
                            execution.record_failure(BatchFailure::new(
                                err.class.to_string(),
                                format!("{}: {} ({chunk_len} items dropped)", err.code, err.message),
                            ));
                            tracing::warn!(
                                step = execution.step_name,
                                chunk_len,
                                error = %err,
                                "Chunk write skipped after retries"
                            );
                            return Ok(true);
                        }
                        ChunkRecovery::Abort => {
                            Self::abort(execution, scope, &err)?;
                            return Ok(false);
                        }
                    }
                }
            }
        }
    }
}

impl<I, O> Step for ChunkStep<I, O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn allow_start_if_complete(&self) -> bool {
        self.allow_start_if_complete
    }

    #[allow(clippy::cast_possible_wrap)]
    fn execute(
        &self,
        execution: &mut StepExecution,
        scope: &StepScope,
    ) -> Result<(), EngineError> {
        execution.start_time = Some(Utc::now());
        execution.transition(BatchStatus::Started);
        scope.store.update_step_execution(execution)?;
        tracing::info!(
            step = execution.step_name,
            chunk_size = self.chunk_size,
            "Step started"
        );

        let mut reader = (self.reader_factory)(&execution.context);
        // Restart offset carried over from prior executions; the
        // counters below are per-execution, the persisted position is
        // cumulative.
        let resume_base = execution.context.get_int("read.count").unwrap_or(0);
        if let Err(err) = reader.open(&execution.context) {
            execution.record_failure(BatchFailure::new(
                err.class.to_string(),
                format!("{}: {}", err.code, err.message),
            ));
            execution.transition(BatchStatus::Failed);
            execution.exit_status = ExitStatus::failed(err.to_string());
            execution.end_time = Some(Utc::now());
            scope.store.update_step_execution(execution)?;
            return Ok(());
        }

        let mut exhausted = false;
        while !exhausted {
            if scope.stop.is_stop_requested() {
                execution.transition(BatchStatus::Stopped);
                execution.exit_status = ExitStatus::stopped();
                tracing::info!(step = execution.step_name, "Stop observed between chunks");
                break;
            }

            let mut inputs = Vec::with_capacity(self.chunk_size);
            match self.fill_chunk(reader.as_mut(), execution, scope, &mut inputs)? {
                Some(at_end) => exhausted = at_end,
                None => return Ok(()),
            }
            if inputs.is_empty() {
                break;
            }

            let Some(outputs) = self.process_chunk(&inputs, execution, scope)? else {
                return Ok(());
            };

            if !outputs.is_empty() && !self.write_chunk(outputs, execution, scope)? {
                return Ok(());
            }

            execution
                .context
                .put_int("read.count", resume_base + execution.read_count as i64);
            reader.update(&mut execution.context);
            scope.store.update_step_execution(execution)?;
        }

        execution.transition(BatchStatus::Completed);
        if execution.status == BatchStatus::Completed {
            execution.exit_status = ExitStatus::completed();
        }
        execution.end_time = Some(Utc::now());
        scope.store.update_step_execution(execution)?;
        tracing::info!(
            step = execution.step_name,
            status = %execution.status,
            read_count = execution.read_count,
            write_count = execution.write_count,
            skip_count = execution.skip_count,
            commit_count = execution.commit_count,
            "Step finished"
        );
        Ok(())
    }
}
