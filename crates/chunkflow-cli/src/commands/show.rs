//! `chunkflow show`: full detail for one execution.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chunkflow_engine::config::{parser, validator};
use chunkflow_state::{ExecutionStore, SqliteExecutionStore};
use chunkflow_types::ExecutionId;

pub fn execute(settings_path: &Path, id: i64) -> Result<()> {
    let settings = parser::parse_settings(settings_path)?;
    validator::validate_settings(&settings)?;

    let store: Arc<dyn ExecutionStore> = match &settings.store.connection {
        Some(path) => Arc::new(SqliteExecutionStore::open(Path::new(path))?),
        None => anyhow::bail!("inspecting executions requires a persistent store.connection"),
    };

    let Some(execution) = store.find_execution(ExecutionId::new(id))? else {
        anyhow::bail!("no execution with id {id}");
    };

    println!("execution #{} of '{}'", execution.id, execution.job_name);
    println!("  status:  {}", execution.status);
    println!(
        "  exit:    {} {}",
        execution.exit_status.code, execution.exit_status.description
    );
    if let Some(start) = execution.start_time {
        println!("  started: {}", start.to_rfc3339());
    }
    if let Some(end) = execution.end_time {
        println!("  ended:   {}", end.to_rfc3339());
    }
    if !execution.parameters.is_empty() {
        println!("  parameters:");
        for (key, value) in execution.parameters.iter() {
            println!("    {key}={value}");
        }
    }

    println!("  steps:");
    for step in &execution.steps {
        println!(
            "    {:<40} {:<9} read={} write={} filter={} skip={} commit={} rollback={}",
            step.step_name,
            step.status.as_str(),
            step.read_count,
            step.write_count,
            step.filter_count,
            step.skip_count,
            step.commit_count,
            step.rollback_count,
        );
        for failure in &step.failures {
            println!("      failure: {failure}");
        }
    }

    if !execution.failures.is_empty() {
        println!("  failures:");
        for failure in &execution.failures {
            println!("    {failure}");
        }
    }
    Ok(())
}
