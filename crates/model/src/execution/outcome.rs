use serde::{Deserialize, Serialize};
use std::fmt;

/// Terminal state of one batch. `Completed` and `PartiallyFailed` both
/// enter the checkpoint's completed set; the distinction lives only in
/// events and logs. `Cancelled` batches never reach the checkpoint and
/// are re-run on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    Completed,
    PartiallyFailed,
    Cancelled,
}

impl BatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOutcome::Completed => "completed",
            BatchOutcome::PartiallyFailed => "partially_failed",
            BatchOutcome::Cancelled => "cancelled",
        }
    }

    /// Whether the batch reached a state worth recording in the
    /// checkpoint.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BatchOutcome::Cancelled)
    }
}

impl fmt::Display for BatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
