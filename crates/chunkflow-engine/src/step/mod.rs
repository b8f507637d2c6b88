//! Step abstraction: one unit of work within a job.

pub mod chunk;
pub mod tasklet;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chunkflow_state::ExecutionStore;
use chunkflow_types::StepExecution;

use crate::errors::EngineError;

pub use chunk::ChunkStep;
pub use tasklet::TaskletStep;

/// Cooperative stop request for a running job.
///
/// Steps observe the token between chunks only, never mid-chunk, so a
/// stop always leaves the last chunk fully committed or fully rolled
/// back.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared services handed to an executing step.
#[derive(Clone)]
pub struct StepScope {
    /// Execution store; the step persists its snapshot here after
    /// every chunk transition.
    pub store: Arc<dyn ExecutionStore>,
    /// Stop request observed between chunks.
    pub stop: StopToken,
}

/// A unit of work within a job.
///
/// `execute` runs synchronously (the orchestrator moves it onto a
/// blocking worker) and records the outcome on the step execution:
/// a fatal batch failure sets the status to `Failed` with the detail
/// in the failure list and still returns `Ok`. `Err` is reserved for
/// infrastructure problems (store I/O, wiring).
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this step re-runs on restart even if a previous
    /// execution of the same instance completed it.
    fn allow_start_if_complete(&self) -> bool {
        false
    }

    fn execute(
        &self,
        execution: &mut StepExecution,
        scope: &StepScope,
    ) -> Result<(), EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_token_starts_clear_and_latches() {
        let token = StopToken::new();
        assert!(!token.is_stop_requested());
        let observer = token.clone();
        token.request_stop();
        assert!(observer.is_stop_requested());
    }
}
