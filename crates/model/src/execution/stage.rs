use crate::core::identifiers::SourceScanId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The three homogeneous operations a batch runs its scans through, in
/// pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Download,
    Upload,
    Create,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Upload => "upload",
            Stage::Create => "create",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single task reached a failed terminal state. `Transfer` covers
/// everything the external client reports after its own retries are
/// exhausted; `transient` records whether the cause was of the
/// retryable class (useful in logs, not consulted by the batch policy).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum TaskFailure {
    Transfer { transient: bool, context: String },
    MissingData { context: String },
    TimedOut,
    Cancelled,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskFailure::Transfer { transient, context } => {
                let class = if *transient { "transient" } else { "permanent" };
                write!(f, "transfer failed ({class}): {context}")
            }
            TaskFailure::MissingData { context } => write!(f, "missing data: {context}"),
            TaskFailure::TimedOut => f.write_str("timed out"),
            TaskFailure::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Aggregate outcome of running one stage over one batch attempt.
/// Only counts and the failed-id set survive the attempt; per-task state
/// is discarded once this summary is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub stage: Stage,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: BTreeSet<SourceScanId>,
}

impl StageResult {
    pub fn empty(stage: Stage) -> Self {
        Self {
            stage,
            attempted: 0,
            succeeded: 0,
            failed: BTreeSet::new(),
        }
    }

    /// Fraction of attempted tasks that succeeded. A stage that ran no
    /// tasks (everything already done from a previous attempt) is
    /// vacuously successful.
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.attempted as f64
        }
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}
