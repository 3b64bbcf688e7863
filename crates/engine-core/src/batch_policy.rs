use model::execution::stage::{Stage, StageResult};
use std::time::Duration;

/// What the orchestrator should do with a batch after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Every stage met its threshold; record the batch and move on.
    Proceed,
    /// At least one stage fell below threshold and attempts remain.
    Retry,
    /// Attempts are exhausted; mark the batch terminally partial.
    Abort,
}

/// Which scans are re-submitted on a retry attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryScope {
    /// Only scans that failed a below-threshold stage; completed work is
    /// never redone.
    FailedItemsOnly,
    /// Every scan in the batch, including already-successful ones.
    WholeBatch,
}

/// Decision for one batch attempt. Produced fresh per evaluation, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryDecision {
    pub action: RetryAction,
    pub delay: Duration,
    pub scope: RetryScope,
    /// Stages whose success rate tripped the retry threshold, for
    /// logging and the retry event.
    pub below_threshold: Vec<Stage>,
}

/// Batch-level retry policy: pure threshold arithmetic over per-stage
/// success rates. The actual waiting happens in the orchestrator, so
/// decisions can be tested without a clock.
#[derive(Debug, Clone)]
pub struct BatchRetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub download_threshold: f64,
    pub upload_threshold: f64,
    pub create_threshold: f64,
}

impl Default for BatchRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            download_threshold: 0.80,
            upload_threshold: 0.80,
            create_threshold: 0.50,
        }
    }
}

impl BatchRetryPolicy {
    pub fn threshold(&self, stage: Stage) -> f64 {
        match stage {
            Stage::Download => self.download_threshold,
            Stage::Upload => self.upload_threshold,
            Stage::Create => self.create_threshold,
        }
    }

    /// Evaluates one attempt's stage results. `attempt_number` is
    /// 1-based; the backoff grows linearly with it.
    pub fn evaluate(&self, results: &[StageResult], attempt_number: u32) -> RetryDecision {
        let below_threshold: Vec<Stage> = results
            .iter()
            .filter(|r| r.success_rate() < self.threshold(r.stage))
            .map(|r| r.stage)
            .collect();

        let action = if below_threshold.is_empty() {
            RetryAction::Proceed
        } else if attempt_number < self.max_retries {
            RetryAction::Retry
        } else {
            RetryAction::Abort
        };

        let delay = match action {
            RetryAction::Retry => self.base_delay * attempt_number,
            _ => Duration::ZERO,
        };

        RetryDecision {
            action,
            delay,
            scope: RetryScope::FailedItemsOnly,
            below_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::core::identifiers::SourceScanId;
    use std::collections::BTreeSet;

    fn stage_result(stage: Stage, attempted: usize, succeeded: usize) -> StageResult {
        let failed: BTreeSet<SourceScanId> = (succeeded as i64 + 1..=attempted as i64)
            .map(SourceScanId::new)
            .collect();
        StageResult {
            stage,
            attempted,
            succeeded,
            failed,
        }
    }

    fn all_passing() -> Vec<StageResult> {
        vec![
            stage_result(Stage::Download, 10, 10),
            stage_result(Stage::Upload, 10, 10),
            stage_result(Stage::Create, 10, 10),
        ]
    }

    #[test]
    fn proceeds_when_every_stage_meets_threshold() {
        let decision = BatchRetryPolicy::default().evaluate(&all_passing(), 1);
        assert_eq!(decision.action, RetryAction::Proceed);
        assert!(decision.below_threshold.is_empty());
        assert_eq!(decision.delay, Duration::ZERO);
    }

    #[test]
    fn download_below_80_percent_retries_with_linear_backoff() {
        let results = vec![
            stage_result(Stage::Download, 10, 7),
            stage_result(Stage::Upload, 7, 7),
            stage_result(Stage::Create, 7, 7),
        ];
        let policy = BatchRetryPolicy::default();

        let first = policy.evaluate(&results, 1);
        assert_eq!(first.action, RetryAction::Retry);
        assert_eq!(first.delay, Duration::from_secs(5));
        assert_eq!(first.scope, RetryScope::FailedItemsOnly);
        assert_eq!(first.below_threshold, vec![Stage::Download]);

        let second = policy.evaluate(&results, 2);
        assert_eq!(second.action, RetryAction::Retry);
        assert_eq!(second.delay, Duration::from_secs(10));

        let last = policy.evaluate(&results, 3);
        assert_eq!(last.action, RetryAction::Abort);
        assert_eq!(last.delay, Duration::ZERO);
    }

    #[test]
    fn create_threshold_is_looser_than_transfer_stages() {
        let policy = BatchRetryPolicy::default();

        // 60% would fail download/upload but passes create.
        let passing = vec![
            stage_result(Stage::Download, 10, 10),
            stage_result(Stage::Upload, 10, 10),
            stage_result(Stage::Create, 10, 6),
        ];
        assert_eq!(policy.evaluate(&passing, 1).action, RetryAction::Proceed);

        // 40% trips the 0.50 create threshold.
        let failing = vec![
            stage_result(Stage::Download, 10, 10),
            stage_result(Stage::Upload, 10, 10),
            stage_result(Stage::Create, 10, 4),
        ];
        let decision = policy.evaluate(&failing, 1);
        assert_eq!(decision.action, RetryAction::Retry);
        assert_eq!(decision.below_threshold, vec![Stage::Create]);
    }

    #[test]
    fn skipped_stage_is_vacuously_passing() {
        // Retry attempt where only create work remains: download and
        // upload ran zero tasks.
        let results = vec![
            StageResult::empty(Stage::Download),
            StageResult::empty(Stage::Upload),
            stage_result(Stage::Create, 3, 3),
        ];
        let decision = BatchRetryPolicy::default().evaluate(&results, 2);
        assert_eq!(decision.action, RetryAction::Proceed);
    }

    #[test]
    fn exhausted_attempts_abort_even_with_multiple_candidates() {
        let results = vec![
            stage_result(Stage::Download, 10, 5),
            stage_result(Stage::Upload, 5, 2),
            stage_result(Stage::Create, 2, 0),
        ];
        let decision = BatchRetryPolicy::default().evaluate(&results, 3);
        assert_eq!(decision.action, RetryAction::Abort);
        assert_eq!(
            decision.below_threshold,
            vec![Stage::Download, Stage::Upload, Stage::Create]
        );
    }
}
