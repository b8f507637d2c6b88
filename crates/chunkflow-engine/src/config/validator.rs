//! Semantic validation for parsed engine settings.

use anyhow::Result;

use crate::config::types::EngineSettings;

/// Validate parsed engine settings.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the
/// settings.
pub fn validate_settings(settings: &EngineSettings) -> Result<()> {
    let mut errors = Vec::new();

    if settings.version != "1.0" {
        errors.push(format!(
            "Unsupported settings version '{}', expected '1.0'",
            settings.version
        ));
    }

    if settings.chunk_size == 0 {
        errors.push("chunk_size must be at least 1".to_string());
    }

    if settings.max_threads == 0 {
        errors.push("max_threads must be at least 1".to_string());
    }

    if settings.retry_limit == 0 {
        errors.push("retry_limit must be at least 1".to_string());
    }

    if settings.grid_size == 0 {
        errors.push("grid_size must be at least 1".to_string());
    }

    if settings.partition_span == 0 {
        errors.push("partition_span must be at least 1".to_string());
    }

    if settings.input.path.trim().is_empty() {
        errors.push("input.path must not be empty".to_string());
    }

    if let Some(connection) = &settings.store.connection {
        if connection.trim().is_empty() {
            errors.push("store.connection must not be empty when set".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("Invalid settings: {}", errors.join("; "))
    }
}
