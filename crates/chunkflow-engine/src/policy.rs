//! Fault-tolerance policy: retry, skip, or abort per failure.
//!
//! The policy is pure decision logic. It inspects the explicit fault
//! class on an [`ItemError`] together with the current attempt and
//! skip counts; the chunk executor owns the counters and applies the
//! returned recovery action.

use std::time::Duration;

use chunkflow_types::{FaultClass, ItemError};

const BACKOFF_MAX_MS: u64 = 2_000;

/// Recovery action for a single-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Re-attempt the same item.
    Retry,
    /// Record the failure, drop the item, continue with the next one.
    Skip,
    /// Roll back the in-flight chunk and fail the step.
    Abort,
}

/// Recovery action for a whole-chunk (sink) failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRecovery {
    /// Re-attempt the whole batch write.
    Retry,
    /// Drop the whole batch, counting every item as skipped.
    SkipChunk,
    /// Roll back and fail the step.
    Abort,
}

/// Bounded retry/skip budget for one step.
#[derive(Debug, Clone, Copy)]
pub struct FaultTolerancePolicy {
    /// Attempts per item (and per chunk write) before a retryable
    /// failure is escalated.
    pub max_attempts: u32,
    /// Skippable failures tolerated before the next one turns fatal.
    pub skip_limit: u64,
    /// Base delay between retry attempts; doubles per attempt, capped.
    /// Zero disables waiting.
    pub backoff_ms: u64,
}

impl Default for FaultTolerancePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            skip_limit: 10,
            backoff_ms: 50,
        }
    }
}

impl FaultTolerancePolicy {
    #[must_use]
    pub fn new(max_attempts: u32, skip_limit: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            skip_limit,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = backoff_ms;
        self
    }

    /// Decide the recovery action for a failed item.
    ///
    /// `attempt` is the number of attempts already made for this item
    /// (1 after the first failure); `skip_count` is the step's current
    /// skip tally.
    #[must_use]
    pub fn on_item_error(&self, error: &ItemError, attempt: u32, skip_count: u64) -> Recovery {
        match error.class {
            FaultClass::Retryable => {
                if attempt < self.max_attempts {
                    Recovery::Retry
                } else if error.skip_on_exhaustion && self.skip_budget_allows(skip_count, 1) {
                    Recovery::Skip
                } else {
                    Recovery::Abort
                }
            }
            FaultClass::Skippable => {
                if self.skip_budget_allows(skip_count, 1) {
                    Recovery::Skip
                } else {
                    Recovery::Abort
                }
            }
            FaultClass::Fatal => Recovery::Abort,
        }
    }

    /// Decide the recovery action for a rejected batch write.
    ///
    /// A bulk-write failure is attributable to the whole batch: the
    /// chunk retries as a unit, and on exhaustion the item-level
    /// classification is applied to the batch as a unit — skipping it
    /// only if the whole batch fits the remaining skip budget.
    #[must_use]
    pub fn on_chunk_error(
        &self,
        error: &ItemError,
        attempt: u32,
        skip_count: u64,
        chunk_len: u64,
    ) -> ChunkRecovery {
        match error.class {
            FaultClass::Retryable => {
                if attempt < self.max_attempts {
                    ChunkRecovery::Retry
                } else if error.skip_on_exhaustion
                    && self.skip_budget_allows(skip_count, chunk_len)
                {
                    ChunkRecovery::SkipChunk
                } else {
                    ChunkRecovery::Abort
                }
            }
            FaultClass::Skippable => {
                if self.skip_budget_allows(skip_count, chunk_len) {
                    ChunkRecovery::SkipChunk
                } else {
                    ChunkRecovery::Abort
                }
            }
            FaultClass::Fatal => ChunkRecovery::Abort,
        }
    }

    /// Exponential backoff for the given attempt number.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        if self.backoff_ms == 0 {
            return Duration::ZERO;
        }
        let delay = self
            .backoff_ms
            .saturating_mul(1_u64 << attempt.saturating_sub(1).min(16));
        Duration::from_millis(delay.min(BACKOFF_MAX_MS))
    }

    fn skip_budget_allows(&self, skip_count: u64, additional: u64) -> bool {
        skip_count.saturating_add(additional) <= self.skip_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FaultTolerancePolicy {
        FaultTolerancePolicy::new(3, 10).with_backoff_ms(0)
    }

    // -----------------------------------------------------------------------
    // Item-level decisions
    // -----------------------------------------------------------------------

    #[test]
    fn retryable_retries_until_exhausted() {
        let err = ItemError::retryable("LOCK", "row locked");
        assert_eq!(policy().on_item_error(&err, 1, 0), Recovery::Retry);
        assert_eq!(policy().on_item_error(&err, 2, 0), Recovery::Retry);
        assert_eq!(policy().on_item_error(&err, 3, 0), Recovery::Abort);
    }

    #[test]
    fn exhausted_retryable_converts_to_skip_when_marked() {
        let err = ItemError::retryable("LOCK", "row locked").with_skip_on_exhaustion();
        assert_eq!(policy().on_item_error(&err, 3, 0), Recovery::Skip);
        // Budget exhausted: fatal instead.
        assert_eq!(policy().on_item_error(&err, 3, 10), Recovery::Abort);
    }

    #[test]
    fn skippable_respects_limit_boundary() {
        let err = ItemError::skippable("BAD_ROW", "unparseable");
        // Tenth skip (count 9 so far) is within the limit of 10.
        assert_eq!(policy().on_item_error(&err, 1, 9), Recovery::Skip);
        // Eleventh would exceed it.
        assert_eq!(policy().on_item_error(&err, 1, 10), Recovery::Abort);
    }

    #[test]
    fn fatal_always_aborts() {
        let err = ItemError::fatal("SINK_DOWN", "connection refused");
        assert_eq!(policy().on_item_error(&err, 1, 0), Recovery::Abort);
    }

    // -----------------------------------------------------------------------
    // Chunk-level decisions
    // -----------------------------------------------------------------------

    #[test]
    fn chunk_write_retries_whole_batch() {
        let err = ItemError::retryable("SINK_BUSY", "timeout");
        assert_eq!(
            policy().on_chunk_error(&err, 1, 0, 10),
            ChunkRecovery::Retry
        );
        assert_eq!(
            policy().on_chunk_error(&err, 3, 0, 10),
            ChunkRecovery::Abort
        );
    }

    #[test]
    fn skippable_chunk_needs_budget_for_every_item() {
        let err = ItemError::skippable("SINK_REJECT", "batch rejected");
        assert_eq!(
            policy().on_chunk_error(&err, 1, 0, 10),
            ChunkRecovery::SkipChunk
        );
        // 5 already skipped + 10 in this chunk exceeds the limit.
        assert_eq!(
            policy().on_chunk_error(&err, 1, 5, 10),
            ChunkRecovery::Abort
        );
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let p = FaultTolerancePolicy::new(5, 0).with_backoff_ms(100);
        assert_eq!(p.retry_delay(1), Duration::from_millis(100));
        assert_eq!(p.retry_delay(2), Duration::from_millis(200));
        assert_eq!(p.retry_delay(3), Duration::from_millis(400));
        assert_eq!(p.retry_delay(10), Duration::from_millis(2_000));
    }

    #[test]
    fn zero_backoff_never_waits() {
        assert_eq!(policy().retry_delay(5), Duration::ZERO);
    }
}
