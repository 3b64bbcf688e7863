use chrono::Utc;
use engine_core::events::EventSink;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use model::core::identifiers::SourceScanId;
use model::events::copy::CopyEvent;
use model::execution::stage::{Stage, StageResult, TaskFailure};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One unit of stage work: a scan id plus the operation that moves it
/// through the current stage.
pub struct StageTask<T> {
    pub scan_id: SourceScanId,
    op: BoxFuture<'static, Result<T, TaskFailure>>,
}

impl<T> StageTask<T> {
    pub fn new<F>(scan_id: SourceScanId, op: F) -> Self
    where
        F: Future<Output = Result<T, TaskFailure>> + Send + 'static,
    {
        Self {
            scan_id,
            op: op.boxed(),
        }
    }
}

/// Execution parameters for one stage run.
pub struct StageContext {
    pub stage: Stage,
    pub batch_number: u32,
    pub concurrency: usize,
    pub task_timeout: Duration,
    pub cancel: CancellationToken,
    pub events: EventSink,
}

/// Everything one stage run produced: per-scan outputs for the next
/// stage, per-scan failures for the ledger, and the aggregate summary
/// the retry policy consumes.
pub struct StagePass<T> {
    pub outputs: HashMap<SourceScanId, T>,
    pub failures: HashMap<SourceScanId, TaskFailure>,
    pub result: StageResult,
}

impl<T> StagePass<T> {
    pub fn empty(stage: Stage) -> Self {
        Self {
            outputs: HashMap::new(),
            failures: HashMap::new(),
            result: StageResult::empty(stage),
        }
    }
}

/// Runs a homogeneous set of tasks with at most `concurrency` in flight.
///
/// Every task reaches a terminal outcome: success, its own error, a
/// per-task timeout, or `Cancelled` for tasks not yet started when the
/// cancellation token fires. A failing task never takes its siblings
/// down; tasks run on their own spawned join handles, so even a panic is
/// contained and recorded against the owning scan.
pub async fn run_stage<T: Send + 'static>(
    ctx: &StageContext,
    tasks: Vec<StageTask<T>>,
) -> StagePass<T> {
    let attempted = tasks.len();
    if attempted == 0 {
        return StagePass::empty(ctx.stage);
    }

    debug!(
        batch = ctx.batch_number,
        stage = %ctx.stage,
        tasks = attempted,
        concurrency = ctx.concurrency,
        "Running stage"
    );

    let task_timeout = ctx.task_timeout;
    let mut completions = stream::iter(tasks.into_iter().map(|task| {
        let cancel = ctx.cancel.clone();
        async move {
            // buffer_unordered starts a task by polling it the first
            // time; a task that only gets polled after cancellation
            // counts as never started.
            if cancel.is_cancelled() {
                return (task.scan_id, Err(TaskFailure::Cancelled));
            }

            let mut handle = tokio::spawn(task.op);
            let outcome = match tokio::time::timeout(task_timeout, &mut handle).await {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(TaskFailure::Transfer {
                    transient: false,
                    context: format!("task aborted: {join_err}"),
                }),
                Err(_) => {
                    handle.abort();
                    Err(TaskFailure::TimedOut)
                }
            };
            (task.scan_id, outcome)
        }
    }))
    .buffer_unordered(ctx.concurrency.max(1));

    let mut outputs = HashMap::with_capacity(attempted);
    let mut failures = HashMap::new();
    let mut failed = BTreeSet::new();
    let mut succeeded = 0usize;
    let mut completed = 0usize;

    while let Some((scan_id, outcome)) = completions.next().await {
        completed += 1;
        let failure = match outcome {
            Ok(output) => {
                outputs.insert(scan_id, output);
                succeeded += 1;
                None
            }
            Err(cause) => {
                failed.insert(scan_id);
                failures.insert(scan_id, cause.clone());
                Some(cause)
            }
        };

        ctx.events.emit(CopyEvent::StageProgress {
            batch_number: ctx.batch_number,
            stage: ctx.stage,
            scan_id,
            failure,
            completed,
            attempted,
            timestamp: Utc::now(),
        });
    }

    StagePass {
        outputs,
        failures,
        result: StageResult {
            stage: ctx.stage,
            attempted,
            succeeded,
            failed,
        },
    }
}
