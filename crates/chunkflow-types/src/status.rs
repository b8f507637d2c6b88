//! Execution status model.
//!
//! [`BatchStatus`] progresses monotonically: `Starting → Started →
//! {Completed | Failed | Stopped}`. An execution never regresses once
//! it reaches a terminal state; [`BatchStatus::upgraded_to`] enforces
//! the rule at every transition site.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a job or step execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Starting,
    Started,
    Completed,
    Failed,
    Stopped,
}

impl BatchStatus {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Parse the wire-format string produced by [`BatchStatus::as_str`].
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "starting" => Some(Self::Starting),
            "started" => Some(Self::Started),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Returns `true` once no further transition is allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Returns `true` for the successful terminal state.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Completed
    }

    /// Apply a monotonic transition.
    ///
    /// Terminal states are sticky: an attempt to move away from one
    /// returns the current state unchanged. `Starting → Started` and
    /// `{Starting, Started} → terminal` are the only forward moves.
    #[must_use]
    pub fn upgraded_to(self, next: Self) -> Self {
        if self.is_terminal() {
            self
        } else {
            next
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit code and human-readable description recorded on a finished
/// execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    pub code: String,
    pub description: String,
}

impl ExitStatus {
    /// Exit status for an execution that has not finished yet.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            code: "UNKNOWN".to_string(),
            description: String::new(),
        }
    }

    /// Successful completion.
    #[must_use]
    pub fn completed() -> Self {
        Self {
            code: "COMPLETED".to_string(),
            description: String::new(),
        }
    }

    /// Failure with diagnostic detail.
    #[must_use]
    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            code: "FAILED".to_string(),
            description: description.into(),
        }
    }

    /// Cooperative stop observed between chunks.
    #[must_use]
    pub fn stopped() -> Self {
        Self {
            code: "STOPPED".to_string(),
            description: String::new(),
        }
    }

    /// Derive the exit status matching a terminal batch status.
    #[must_use]
    pub fn from_status(status: BatchStatus, description: &str) -> Self {
        match status {
            BatchStatus::Completed => Self::completed(),
            BatchStatus::Stopped => Self::stopped(),
            BatchStatus::Failed => Self::failed(description),
            BatchStatus::Starting | BatchStatus::Started => Self::unknown(),
        }
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_as_str_roundtrip() {
        for status in [
            BatchStatus::Starting,
            BatchStatus::Started,
            BatchStatus::Completed,
            BatchStatus::Failed,
            BatchStatus::Stopped,
        ] {
            assert_eq!(BatchStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BatchStatus::parse("bogus"), None);
    }

    #[test]
    fn terminal_states_are_sticky() {
        assert_eq!(
            BatchStatus::Completed.upgraded_to(BatchStatus::Started),
            BatchStatus::Completed
        );
        assert_eq!(
            BatchStatus::Failed.upgraded_to(BatchStatus::Completed),
            BatchStatus::Failed
        );
        assert_eq!(
            BatchStatus::Stopped.upgraded_to(BatchStatus::Failed),
            BatchStatus::Stopped
        );
    }

    #[test]
    fn forward_transitions_apply() {
        assert_eq!(
            BatchStatus::Starting.upgraded_to(BatchStatus::Started),
            BatchStatus::Started
        );
        assert_eq!(
            BatchStatus::Started.upgraded_to(BatchStatus::Completed),
            BatchStatus::Completed
        );
    }

    #[test]
    fn exit_status_from_terminal() {
        assert_eq!(
            ExitStatus::from_status(BatchStatus::Completed, "").code,
            "COMPLETED"
        );
        let failed = ExitStatus::from_status(BatchStatus::Failed, "sink unavailable");
        assert_eq!(failed.code, "FAILED");
        assert_eq!(failed.description, "sink unavailable");
    }

    #[test]
    fn status_serde_roundtrip() {
        let json = serde_json::to_string(&BatchStatus::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
        let back: BatchStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, BatchStatus::Stopped);
    }
}
