//! Engine settings types with serde defaults.
//!
//! One explicit configuration struct, built at startup and passed by
//! reference into constructors. Defaults mirror the conventional
//! deployment: chunks of 10, 4 worker threads, 3 attempts, skip limit
//! 10, 4 partitions of span 1000.

use serde::{Deserialize, Serialize};

use crate::policy::FaultTolerancePolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub version: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_skip_limit")]
    pub skip_limit: u64,
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,
    #[serde(default = "default_partition_span")]
    pub partition_span: u64,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub input: InputSettings,
    #[serde(default)]
    pub output: OutputSettings,
}

impl EngineSettings {
    /// Fault-tolerance policy derived from the retry/skip settings.
    #[must_use]
    pub fn policy(&self) -> FaultTolerancePolicy {
        FaultTolerancePolicy::new(self.retry_limit, self.skip_limit)
            .with_backoff_ms(self.retry_backoff_ms)
    }
}

fn default_chunk_size() -> usize {
    10
}
fn default_max_threads() -> usize {
    4
}
fn default_retry_limit() -> u32 {
    3
}
fn default_skip_limit() -> u64 {
    10
}
fn default_grid_size() -> u32 {
    4
}
fn default_partition_span() -> u64 {
    1_000
}
fn default_retry_backoff_ms() -> u64 {
    50
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendKind {
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackendKind,
    /// Database path; in-memory when omitted.
    pub connection: Option<String>,
}

fn default_store_backend() -> StoreBackendKind {
    StoreBackendKind::Sqlite
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            connection: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSettings {
    #[serde(default = "default_input_path")]
    pub path: String,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Leading lines to skip (header).
    #[serde(default = "default_skip_lines")]
    pub skip_lines: usize,
}

fn default_input_path() -> String {
    "data/customers.csv".to_string()
}
fn default_delimiter() -> char {
    ','
}
fn default_skip_lines() -> usize {
    1
}

impl Default for InputSettings {
    fn default() -> Self {
        Self {
            path: default_input_path(),
            delimiter: default_delimiter(),
            skip_lines: default_skip_lines(),
        }
    }
}

/// Output sink location; in-memory when no connection is given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputSettings {
    pub connection: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_settings_apply_defaults() {
        let yaml = r#"
version: "1.0"
"#;
        let settings: EngineSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.chunk_size, 10);
        assert_eq!(settings.max_threads, 4);
        assert_eq!(settings.retry_limit, 3);
        assert_eq!(settings.skip_limit, 10);
        assert_eq!(settings.grid_size, 4);
        assert_eq!(settings.partition_span, 1_000);
        assert_eq!(settings.store.backend, StoreBackendKind::Sqlite);
        assert!(settings.store.connection.is_none());
        assert_eq!(settings.input.delimiter, ',');
        assert_eq!(settings.input.skip_lines, 1);
    }

    #[test]
    fn full_settings_parse() {
        let yaml = r#"
version: "1.0"
chunk_size: 25
max_threads: 8
retry_limit: 5
skip_limit: 50
grid_size: 6
partition_span: 500
retry_backoff_ms: 0
store:
  backend: sqlite
  connection: /tmp/chunkflow.db
input:
  path: /data/in.csv
  delimiter: ";"
  skip_lines: 0
"#;
        let settings: EngineSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.chunk_size, 25);
        assert_eq!(settings.grid_size, 6);
        assert_eq!(
            settings.store.connection.as_deref(),
            Some("/tmp/chunkflow.db")
        );
        assert_eq!(settings.input.delimiter, ';');

        let policy = settings.policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.skip_limit, 50);
        assert_eq!(policy.backoff_ms, 0);
    }
}
