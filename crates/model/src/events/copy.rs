use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::identifiers::{RunId, SourceScanId};
use crate::execution::outcome::BatchOutcome;
use crate::execution::stage::{Stage, TaskFailure};

/// Structured progress events emitted by the copy engine. Consumers
/// (console printer, telemetry sink) own the formatting; the `Display`
/// impl is the default textual rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CopyEvent {
    /// Emitted once, before the first batch.
    RunStarted {
        run_id: RunId,
        total_scans: usize,
        total_batches: u32,
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a batch begins its first attempt.
    BatchStarted {
        batch_number: u32,
        total_batches: u32,
        scan_ids: Vec<SourceScanId>,
        timestamp: DateTime<Utc>,
    },

    /// Emitted after every task completion inside a stage, with running
    /// totals for the current attempt.
    StageProgress {
        batch_number: u32,
        stage: Stage,
        scan_id: SourceScanId,
        failure: Option<TaskFailure>,
        completed: usize,
        attempted: usize,
        timestamp: DateTime<Utc>,
    },

    /// Emitted when the retry policy sends a batch back for another
    /// attempt over its failed scans.
    BatchRetrying {
        batch_number: u32,
        attempt: u32,
        max_retries: u32,
        delay_ms: u64,
        stages: Vec<Stage>,
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a batch reaches a terminal state.
    BatchCompleted {
        batch_number: u32,
        total_batches: u32,
        succeeded: usize,
        failed: usize,
        outcome: BatchOutcome,
        timestamp: DateTime<Utc>,
    },

    /// Emitted once at run end, whatever happened in between.
    RunCompleted {
        run_id: RunId,
        succeeded: usize,
        failed: u64,
        checkpoint: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Emitted when a run-level cancellation suppresses further batches.
    RunCancelled {
        run_id: RunId,
        timestamp: DateTime<Utc>,
    },
}

impl CopyEvent {
    /// Unique identifier for the event kind, for filtering/routing.
    pub fn event_type(&self) -> &'static str {
        match self {
            CopyEvent::RunStarted { .. } => "run.started",
            CopyEvent::BatchStarted { .. } => "batch.started",
            CopyEvent::StageProgress { .. } => "stage.progress",
            CopyEvent::BatchRetrying { .. } => "batch.retrying",
            CopyEvent::BatchCompleted { .. } => "batch.completed",
            CopyEvent::RunCompleted { .. } => "run.completed",
            CopyEvent::RunCancelled { .. } => "run.cancelled",
        }
    }

    pub fn is_error(&self) -> bool {
        match self {
            CopyEvent::StageProgress { failure, .. } => failure.is_some(),
            CopyEvent::BatchCompleted { outcome, .. } => {
                matches!(outcome, BatchOutcome::PartiallyFailed)
            }
            _ => false,
        }
    }

    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            CopyEvent::RunStarted { timestamp, .. }
            | CopyEvent::BatchStarted { timestamp, .. }
            | CopyEvent::StageProgress { timestamp, .. }
            | CopyEvent::BatchRetrying { timestamp, .. }
            | CopyEvent::BatchCompleted { timestamp, .. }
            | CopyEvent::RunCompleted { timestamp, .. }
            | CopyEvent::RunCancelled { timestamp, .. } => timestamp,
        }
    }
}

impl fmt::Display for CopyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyEvent::RunStarted {
                run_id,
                total_scans,
                total_batches,
                ..
            } => write!(
                f,
                "Run started: {total_scans} scans in {total_batches} batches (run={run_id})"
            ),

            CopyEvent::BatchStarted {
                batch_number,
                total_batches,
                scan_ids,
                ..
            } => {
                let ids = scan_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "[batch {batch_number}/{total_batches}] Starting with scans: {ids}"
                )
            }

            CopyEvent::StageProgress {
                batch_number,
                stage,
                scan_id,
                failure,
                completed,
                attempted,
                ..
            } => {
                let pct = if *attempted == 0 {
                    100
                } else {
                    completed * 100 / attempted
                };
                match failure {
                    None => write!(
                        f,
                        "[batch {batch_number}] [{stage}] scan {scan_id} ok, {completed}/{attempted} ({pct}%)"
                    ),
                    Some(cause) => write!(
                        f,
                        "[batch {batch_number}] [{stage}] scan {scan_id} failed ({cause}), {completed}/{attempted} ({pct}%)"
                    ),
                }
            }

            CopyEvent::BatchRetrying {
                batch_number,
                attempt,
                max_retries,
                delay_ms,
                stages,
                ..
            } => {
                let stages = stages
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(
                    f,
                    "[batch {batch_number}] Retrying attempt {attempt}/{max_retries} after {delay_ms}ms (below threshold: {stages})"
                )
            }

            CopyEvent::BatchCompleted {
                batch_number,
                total_batches,
                succeeded,
                failed,
                outcome,
                ..
            } => write!(
                f,
                "[batch {batch_number}/{total_batches}] {outcome}: success {succeeded}, failed {failed}"
            ),

            CopyEvent::RunCompleted {
                run_id,
                succeeded,
                failed,
                checkpoint,
                ..
            } => {
                let cp = checkpoint.as_deref().unwrap_or("removed (clean run)");
                write!(
                    f,
                    "Run completed: {succeeded} copied, {failed} failed, checkpoint: {cp} (run={run_id})"
                )
            }

            CopyEvent::RunCancelled { run_id, .. } => {
                write!(f, "Run cancelled, progress saved (run={run_id})")
            }
        }
    }
}
