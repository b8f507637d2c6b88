//! Engine error model.
//!
//! `EngineError` separates classified item-level failures (handled by
//! the fault-tolerance policy) from opaque infrastructure failures
//! (store I/O, worker panics, invalid wiring) that are never retryable
//! at the item level.

use chunkflow_state::StoreError;
use chunkflow_types::ItemError;

/// Categorized engine error.
///
/// `Item` wraps a typed [`ItemError`] carrying its fault
/// classification. `Infrastructure` wraps host-side errors (execution
/// store failures, worker pool errors, invalid job wiring).
#[derive(Debug)]
pub enum EngineError {
    /// Typed item error with an explicit fault class.
    Item(ItemError),
    /// Infrastructure error (store, worker pool, wiring).
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Item(e) => write!(f, "{e}"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<ItemError> for EngineError {
    fn from(e: ItemError) -> Self {
        Self::Item(e)
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        Self::Infrastructure(e.into())
    }
}

impl EngineError {
    /// Returns the typed item error if this is an `Item` variant.
    #[must_use]
    pub fn as_item_error(&self) -> Option<&ItemError> {
        match self {
            Self::Item(e) => Some(e),
            Self::Infrastructure(_) => None,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Item(e) => e.is_retryable(),
            Self::Infrastructure(_) => false,
        }
    }
}

/// Errors surfaced by [`JobLauncher::launch`](crate::JobLauncher::launch).
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// An identical-parameter instance already completed.
    #[error("job '{job_name}' already completed with identical parameters")]
    DuplicateInstance { job_name: String },

    /// Required launch parameters are missing.
    #[error("missing required job parameter(s): {}", missing.join(", "))]
    InvalidParameters { missing: Vec<String> },

    /// Execution store failure.
    #[error(transparent)]
    State(#[from] StoreError),

    /// Engine failure while running the job.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunkflow_types::FaultClass;

    #[test]
    fn item_error_keeps_classification() {
        let err = EngineError::Item(ItemError::retryable("LOCK", "row locked"));
        assert!(err.is_retryable());
        assert_eq!(err.as_item_error().unwrap().class, FaultClass::Retryable);
    }

    #[test]
    fn infrastructure_not_retryable() {
        let err = EngineError::Infrastructure(anyhow::anyhow!("store gone"));
        assert!(!err.is_retryable());
        assert!(err.as_item_error().is_none());
    }

    #[test]
    fn launch_error_lists_missing_parameters() {
        let err = LaunchError::InvalidParameters {
            missing: vec!["file".to_string(), "run.id".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("file"));
        assert!(msg.contains("run.id"));
    }

    #[test]
    fn store_error_converts_to_infrastructure() {
        let store_err = StoreError::LockPoisoned;
        let engine_err: EngineError = store_err.into();
        assert!(matches!(engine_err, EngineError::Infrastructure(_)));
    }
}
