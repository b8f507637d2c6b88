//! `chunkflow executions`: page through recorded job executions.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use chunkflow_engine::config::{parser, validator};
use chunkflow_state::{ExecutionStore, SqliteExecutionStore};

pub fn execute(
    settings_path: &Path,
    job_name: Option<&str>,
    page: u64,
    size: u64,
) -> Result<()> {
    let settings = parser::parse_settings(settings_path)?;
    validator::validate_settings(&settings)?;

    let store: Arc<dyn ExecutionStore> = match &settings.store.connection {
        Some(path) => Arc::new(SqliteExecutionStore::open(Path::new(path))?),
        None => anyhow::bail!("listing executions requires a persistent store.connection"),
    };

    let listing = store.list_executions(job_name, page, size)?;
    println!(
        "page {page} ({} executions, {} pages)",
        listing.total_elements, listing.total_pages
    );
    for execution in &listing.content {
        let started = execution
            .start_time
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  #{:<6} {:<32} {:<9} exit={:<9} started={} steps={}",
            execution.id,
            execution.job_name,
            execution.status.as_str(),
            execution.exit_status.code,
            started,
            execution.steps.len(),
        );
    }
    Ok(())
}
