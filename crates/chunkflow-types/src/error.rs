//! Classified item error model.
//!
//! [`ItemError`] carries an explicit [`FaultClass`] tag that the
//! fault-tolerance policy checks directly: retryable errors are
//! re-attempted, skippable errors drop the item within a bounded
//! budget, anything fatal aborts the step. Construct via the
//! class-specific factory methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Explicit fault classification, checked by the fault-tolerance
/// policy instead of error-type hierarchy inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultClass {
    /// Transient: re-attempt the same item up to the attempt limit.
    Retryable,
    /// Drop the item from the chunk's output, bounded by the skip limit.
    Skippable,
    /// Abort the step; the in-flight chunk rolls back.
    Fatal,
}

impl fmt::Display for FaultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Retryable => "retryable",
            Self::Skippable => "skippable",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Structured failure raised by a reader, processor, or writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{class}] {code}: {message}")]
pub struct ItemError {
    pub class: FaultClass,
    pub code: String,
    pub message: String,
    /// For retryable errors only: once attempts are exhausted, convert
    /// the failure into a skip instead of a fatal abort.
    #[serde(default)]
    pub skip_on_exhaustion: bool,
}

impl ItemError {
    fn new(class: FaultClass, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class,
            code: code.into(),
            message: message.into(),
            skip_on_exhaustion: false,
        }
    }

    /// Transient failure worth re-attempting (e.g. a lock timeout).
    #[must_use]
    pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FaultClass::Retryable, code, message)
    }

    /// Per-item failure whose item should be dropped from the output.
    #[must_use]
    pub fn skippable(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FaultClass::Skippable, code, message)
    }

    /// Unrecoverable failure: aborts the step and rolls back the chunk.
    #[must_use]
    pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(FaultClass::Fatal, code, message)
    }

    /// Mark a retryable error as skippable once attempts are exhausted.
    #[must_use]
    pub fn with_skip_on_exhaustion(mut self) -> Self {
        self.skip_on_exhaustion = true;
        self
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class == FaultClass::Retryable
    }

    #[must_use]
    pub fn is_skippable(&self) -> bool {
        self.class == FaultClass::Skippable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factories_set_class() {
        assert_eq!(
            ItemError::retryable("LOCK_TIMEOUT", "row locked").class,
            FaultClass::Retryable
        );
        assert_eq!(
            ItemError::skippable("BAD_ROW", "unparseable").class,
            FaultClass::Skippable
        );
        assert_eq!(
            ItemError::fatal("SINK_DOWN", "connection refused").class,
            FaultClass::Fatal
        );
    }

    #[test]
    fn skip_on_exhaustion_defaults_off() {
        let err = ItemError::retryable("X", "y");
        assert!(!err.skip_on_exhaustion);
        assert!(err.with_skip_on_exhaustion().skip_on_exhaustion);
    }

    #[test]
    fn display_format() {
        let err = ItemError::skippable("BAD_ROW", "missing field");
        assert_eq!(err.to_string(), "[skippable] BAD_ROW: missing field");
    }

    #[test]
    fn serde_roundtrip() {
        let err = ItemError::retryable("DEADLOCK", "deadlock detected").with_skip_on_exhaustion();
        let json = serde_json::to_string(&err).unwrap();
        let back: ItemError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}
