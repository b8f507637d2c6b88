//! `chunkflow run`: build one of the demo customer jobs from the
//! settings file and drive it to completion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use chunkflow_engine::config::{parser, validator, EngineSettings};
use chunkflow_engine::{
    ChunkStep, ItemError, ItemReader, JobDefinition, JobLauncher, Outcome, PartitionedStep,
    RangePartitioner, SummaryListener, TaskletStep, TimingListener,
};
use chunkflow_state::{ExecutionStore, SqliteExecutionStore};
use chunkflow_types::{BatchStatus, JobParameters, StepExecution};
use clap::ValueEnum;

use crate::customer::{
    CustomerFileReader, CustomerProcessor, CustomerRecord, CustomerStatus, SqliteCustomerWriter,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JobKind {
    /// Single chunk step: delimited file into the customers table.
    Import,
    /// Import plus validation and cleanup tasklets.
    Complex,
    /// Range-partitioned import on the worker pool.
    Partitioned,
}

impl JobKind {
    fn job_name(self) -> &'static str {
        match self {
            Self::Import => "import_customers",
            Self::Complex => "complex_customer_processing",
            Self::Partitioned => "partitioned_customer_import",
        }
    }
}

pub async fn execute(
    settings_path: &Path,
    kind: JobKind,
    user_params: Vec<(String, String)>,
    no_increment: bool,
) -> Result<()> {
    let settings = parser::parse_settings(settings_path)?;
    validator::validate_settings(&settings)?;

    let store: Arc<dyn ExecutionStore> = match &settings.store.connection {
        Some(path) => Arc::new(SqliteExecutionStore::open(Path::new(path))?),
        None => Arc::new(SqliteExecutionStore::in_memory()?),
    };
    let launcher = JobLauncher::new(store.clone())
        .with_listener(Arc::new(TimingListener::new()))
        .with_listener(Arc::new(SummaryListener));

    let mut parameters: JobParameters = user_params.into_iter().collect();
    if !no_increment {
        // Fresh identity per launch unless the caller wants to target
        // an existing instance.
        parameters.insert(
            "run.id",
            Utc::now().format("%Y-%m-%d-%H-%M-%S").to_string(),
        );
    }

    let writer = build_writer(&settings)?;
    let job = build_job(kind, &settings, writer.clone())?;

    let handle = launcher.launch(&job, parameters).await?;
    tracing::info!(
        job = job.name(),
        execution_id = %handle.id,
        status = %handle.status,
        "Launch finished"
    );

    if let Some(execution) = store.find_execution(handle.id)? {
        println!(
            "execution {} of '{}' finished: {} ({})",
            execution.id, execution.job_name, execution.status, execution.exit_status.code
        );
        for step in &execution.steps {
            println!(
                "  step {:<40} {:<9} read={} write={} filter={} skip={} commit={} rollback={}",
                step.step_name,
                step.status.as_str(),
                step.read_count,
                step.write_count,
                step.filter_count,
                step.skip_count,
                step.commit_count,
                step.rollback_count,
            );
        }
        for failure in &execution.failures {
            println!("  failure: {failure}");
        }
    }

    let processed = writer.count_by_status(CustomerStatus::Processed);
    let failed = writer.count_by_status(CustomerStatus::Failed);
    if let (Ok(processed), Ok(failed)) = (processed, failed) {
        println!("customers written: {processed} processed, {failed} failed");
    }

    if handle.status != BatchStatus::Completed {
        anyhow::bail!("job '{}' finished {}", job.name(), handle.status);
    }
    Ok(())
}

fn build_writer(settings: &EngineSettings) -> Result<Arc<SqliteCustomerWriter>> {
    let writer = match &settings.output.connection {
        Some(path) => SqliteCustomerWriter::open_path(Path::new(path)),
        None => SqliteCustomerWriter::in_memory(),
    }
    .map_err(|e| anyhow::anyhow!("failed to open output sink: {e}"))?;
    Ok(Arc::new(writer))
}

fn build_job(
    kind: JobKind,
    settings: &EngineSettings,
    writer: Arc<SqliteCustomerWriter>,
) -> Result<JobDefinition> {
    let import_step = |name: &str| {
        let input_path = PathBuf::from(&settings.input.path);
        let delimiter = settings.input.delimiter;
        let has_header = settings.input.skip_lines > 0;
        Arc::new(
            ChunkStep::new(
                name,
                move |_context| -> Box<dyn ItemReader<CustomerRecord>> {
                    match CustomerFileReader::open_file(&input_path, delimiter, has_header) {
                        Ok(reader) => Box::new(reader),
                        Err(error) => Box::new(BrokenReader { error: Some(error) }),
                    }
                },
                Arc::new(CustomerProcessor),
                writer.clone(),
            )
            .with_chunk_size(settings.chunk_size)
            .with_policy(settings.policy())
            .with_allow_start_if_complete(true),
        )
    };

    let job = match kind {
        JobKind::Import => {
            JobDefinition::linear(kind.job_name(), vec![import_step("csv_to_db")])?
        }
        JobKind::Complex => JobDefinition::linear(
            kind.job_name(),
            vec![
                import_step("csv_to_db"),
                Arc::new(
                    TaskletStep::new("data_validation", |_: &mut StepExecution| {
                        tracing::info!("Performing data validation");
                        Ok(())
                    })
                    .with_allow_start_if_complete(true),
                ),
                Arc::new(
                    TaskletStep::new("data_cleanup", |_: &mut StepExecution| {
                        tracing::info!("Performing data cleanup");
                        Ok(())
                    })
                    .with_allow_start_if_complete(true),
                ),
            ],
        )?,
        JobKind::Partitioned => {
            let partitioned = Arc::new(
                PartitionedStep::new(
                    "partition_step",
                    import_step("customer_processing"),
                    Arc::new(RangePartitioner::new(settings.partition_span)),
                )
                .with_grid_size(settings.grid_size)
                .with_max_workers(settings.max_threads),
            );
            let mut builder = JobDefinition::builder(kind.job_name());
            let node = builder.partitioned(partitioned);
            builder.end(node, Outcome::completed(), BatchStatus::Completed);
            builder.build()?
        }
    };
    Ok(job)
}

/// Stand-in reader that surfaces an open failure through the normal
/// read path, keeping the reader factory infallible.
struct BrokenReader {
    error: Option<ItemError>,
}

impl ItemReader<CustomerRecord> for BrokenReader {
    fn read(&mut self) -> Result<Option<CustomerRecord>, ItemError> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(None),
        }
    }
}

pub fn parse_key_val(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("expected key=value, got '{raw}'"))?;
    anyhow::ensure!(!key.trim().is_empty(), "empty parameter name in '{raw}'");
    Ok((key.to_string(), value.to_string()))
}
