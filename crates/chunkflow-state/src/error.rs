//! Execution store error types.

/// Errors produced by [`ExecutionStore`](crate::ExecutionStore)
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure list or execution context could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Internal mutex was poisoned by a panicked thread.
    #[error("execution store lock poisoned")]
    LockPoisoned,

    /// A stored row failed to decode into its model type.
    #[error("corrupt execution row: {0}")]
    Corrupt(String),

    /// The instance's latest execution already completed and restart
    /// was not explicitly allowed.
    #[error("job instance for '{job_name}' already completed with identical parameters")]
    DuplicateInstance { job_name: String },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_instance_names_the_job() {
        let err = StoreError::DuplicateInstance {
            job_name: "import_customers".to_string(),
        };
        assert!(err.to_string().contains("import_customers"));
    }

    #[test]
    fn lock_poisoned_displays() {
        assert_eq!(
            StoreError::LockPoisoned.to_string(),
            "execution store lock poisoned"
        );
    }

    #[test]
    fn io_error_wraps() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = StoreError::Io(inner);
        assert!(err.to_string().contains("i/o"));
    }
}
