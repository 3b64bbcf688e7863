use crate::client::ScanTransferClient;
use crate::execution::pool::{self, StageContext, StagePass, StageTask};
use chrono::Utc;
use engine_core::batch_policy::{BatchRetryPolicy, RetryAction};
use engine_core::config::RunConfig;
use engine_core::events::EventSink;
use engine_core::state::models::ScanMapping;
use model::core::identifiers::{FileId, SourceScanId, TargetScanId, UploadId};
use model::events::copy::CopyEvent;
use model::execution::outcome::BatchOutcome;
use model::execution::stage::{Stage, StageResult, TaskFailure};
use model::records::batch::Batch;
use model::records::scan::{DownloadedFile, ScanRecord};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Files already pulled from the source during this batch, keyed by file
/// id so a file shared by several scans transfers once.
type FileCache = Arc<Mutex<HashMap<FileId, Arc<DownloadedFile>>>>;
type UploadCache = Arc<Mutex<HashMap<FileId, UploadId>>>;

/// Per-scan progress inside one batch. Survives retry attempts so a
/// retry only redoes the stages a scan actually failed; finished
/// artifacts are never re-transferred.
#[derive(Default)]
struct ScanArtifacts {
    downloaded: Option<Vec<Arc<DownloadedFile>>>,
    uploaded: Option<Vec<UploadId>>,
    created: Option<TargetScanId>,
    failure: Option<TaskFailure>,
    /// Set when no amount of retrying can help (record missing from the
    /// source, no files, unusable payload).
    unprocessable: bool,
}

/// Terminal accounting for one batch.
#[derive(Debug)]
pub struct BatchReport {
    pub batch_number: u32,
    pub outcome: BatchOutcome,
    pub mappings: Vec<ScanMapping>,
    pub failed: u64,
}

pub struct OrchestratorParams {
    pub client: Arc<dyn ScanTransferClient>,
    pub config: RunConfig,
    pub target_store_id: i64,
    pub captured_at: i64,
    pub cancel: CancellationToken,
    pub events: EventSink,
}

/// Drives one batch at a time through download → upload → create,
/// consulting the batch retry policy between attempts. Batches are
/// isolated: however badly one ends, the next one starts fresh.
pub struct BatchOrchestrator {
    client: Arc<dyn ScanTransferClient>,
    config: RunConfig,
    policy: BatchRetryPolicy,
    target_store_id: i64,
    captured_at: i64,
    cancel: CancellationToken,
    events: EventSink,
}

impl BatchOrchestrator {
    pub fn new(params: OrchestratorParams) -> Self {
        let policy = params.config.batch_retry_policy();
        Self {
            client: params.client,
            config: params.config,
            policy,
            target_store_id: params.target_store_id,
            captured_at: params.captured_at,
            cancel: params.cancel,
            events: params.events,
        }
    }

    pub async fn process_batch(
        &self,
        batch: &Batch,
        records: &HashMap<SourceScanId, Arc<ScanRecord>>,
    ) -> BatchReport {
        info!(
            batch = batch.batch_number,
            total = batch.total_batches,
            scans = batch.len(),
            "Starting batch"
        );
        self.events.emit(CopyEvent::BatchStarted {
            batch_number: batch.batch_number,
            total_batches: batch.total_batches,
            scan_ids: batch.scan_ids.clone(),
            timestamp: Utc::now(),
        });

        let deadline = Instant::now() + self.config.batch_budget;
        let mut ledger = self.seed_ledger(batch, records);
        let file_cache: FileCache = Arc::new(Mutex::new(HashMap::new()));
        let upload_cache: UploadCache = Arc::new(Mutex::new(HashMap::new()));

        let mut attempt: u32 = 1;
        let outcome = loop {
            if self.cancel.is_cancelled() {
                break BatchOutcome::Cancelled;
            }
            if Instant::now() >= deadline {
                self.mark_budget_exhausted(&mut ledger, batch);
                break BatchOutcome::PartiallyFailed;
            }

            let download = self
                .run_download(batch, records, &mut ledger, &file_cache, deadline)
                .await;
            let upload = self
                .run_upload(batch, &mut ledger, &upload_cache, deadline)
                .await;
            let create = self
                .run_create(batch, records, &mut ledger, deadline)
                .await;

            if self.cancel.is_cancelled() {
                break BatchOutcome::Cancelled;
            }

            let decision = self.policy.evaluate(&[download, upload, create], attempt);
            match decision.action {
                RetryAction::Proceed => break self.terminal_outcome(&ledger),
                RetryAction::Abort => {
                    warn!(
                        batch = batch.batch_number,
                        attempt, "Retry budget exhausted, recording batch as partial"
                    );
                    break BatchOutcome::PartiallyFailed;
                }
                RetryAction::Retry => {
                    info!(
                        batch = batch.batch_number,
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = decision.delay.as_millis() as u64,
                        "Stage success below threshold, retrying failed scans"
                    );
                    self.events.emit(CopyEvent::BatchRetrying {
                        batch_number: batch.batch_number,
                        attempt,
                        max_retries: self.policy.max_retries,
                        delay_ms: decision.delay.as_millis() as u64,
                        stages: decision.below_threshold.clone(),
                        timestamp: Utc::now(),
                    });

                    let remaining = deadline.duration_since(Instant::now());
                    let pause = decision.delay.min(remaining);
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = self.cancel.cancelled() => break BatchOutcome::Cancelled,
                    }
                    if Instant::now() >= deadline {
                        self.mark_budget_exhausted(&mut ledger, batch);
                        break BatchOutcome::PartiallyFailed;
                    }
                    attempt += 1;
                }
            }
        };

        self.finish_batch(batch, ledger, outcome)
    }

    fn seed_ledger(
        &self,
        batch: &Batch,
        records: &HashMap<SourceScanId, Arc<ScanRecord>>,
    ) -> BTreeMap<SourceScanId, ScanArtifacts> {
        let mut ledger = BTreeMap::new();
        for &scan_id in &batch.scan_ids {
            let mut artifacts = ScanArtifacts::default();
            let context = match records.get(&scan_id) {
                None => Some("scan not found in source"),
                Some(record) if record.files.is_empty() => Some("scan has no files"),
                Some(_) => None,
            };
            if let Some(context) = context {
                warn!(scan = %scan_id, batch = batch.batch_number, context, "Scan cannot be copied");
                artifacts.unprocessable = true;
                artifacts.failure = Some(TaskFailure::MissingData {
                    context: context.to_string(),
                });
            }
            ledger.insert(scan_id, artifacts);
        }
        ledger
    }

    fn stage_context(&self, stage: Stage, batch: &Batch, deadline: Instant) -> StageContext {
        // Cap every task by whatever is left of the batch budget so a
        // stage cannot outlive the deadline by a full task timeout.
        let remaining = deadline
            .duration_since(Instant::now())
            .max(Duration::from_millis(1));
        StageContext {
            stage,
            batch_number: batch.batch_number,
            concurrency: self.config.worker_limit(stage),
            task_timeout: self.config.task_timeout(stage).min(remaining),
            cancel: self.cancel.clone(),
            events: self.events.clone(),
        }
    }

    async fn run_download(
        &self,
        batch: &Batch,
        records: &HashMap<SourceScanId, Arc<ScanRecord>>,
        ledger: &mut BTreeMap<SourceScanId, ScanArtifacts>,
        file_cache: &FileCache,
        deadline: Instant,
    ) -> StageResult {
        let mut tasks = Vec::new();
        for (&scan_id, artifacts) in ledger.iter() {
            if artifacts.unprocessable
                || artifacts.created.is_some()
                || artifacts.downloaded.is_some()
            {
                continue;
            }
            let Some(record) = records.get(&scan_id).cloned() else {
                continue;
            };
            let client = self.client.clone();
            let cache = file_cache.clone();
            tasks.push(StageTask::new(scan_id, async move {
                let mut files = Vec::with_capacity(record.files.len());
                for image in &record.files {
                    let cached = cache.lock().await.get(&image.file_id).cloned();
                    let file = match cached {
                        Some(file) => file,
                        None => {
                            let downloaded = client
                                .download_file(record.id, image)
                                .await
                                .map_err(TaskFailure::from)?;
                            let downloaded = Arc::new(downloaded);
                            cache.lock().await.insert(image.file_id, downloaded.clone());
                            downloaded
                        }
                    };
                    files.push(file);
                }
                Ok(files)
            }));
        }

        let ctx = self.stage_context(Stage::Download, batch, deadline);
        let pass = pool::run_stage(&ctx, tasks).await;
        Self::apply_pass(ledger, pass, |artifacts, files| {
            artifacts.downloaded = Some(files);
        })
    }

    async fn run_upload(
        &self,
        batch: &Batch,
        ledger: &mut BTreeMap<SourceScanId, ScanArtifacts>,
        upload_cache: &UploadCache,
        deadline: Instant,
    ) -> StageResult {
        let mut tasks = Vec::new();
        for (&scan_id, artifacts) in ledger.iter() {
            if artifacts.unprocessable || artifacts.created.is_some() || artifacts.uploaded.is_some()
            {
                continue;
            }
            let Some(files) = artifacts.downloaded.clone() else {
                continue;
            };
            let client = self.client.clone();
            let cache = upload_cache.clone();
            tasks.push(StageTask::new(scan_id, async move {
                let mut uploads = Vec::with_capacity(files.len());
                for file in &files {
                    let cached = cache.lock().await.get(&file.file_id).cloned();
                    let upload_id = match cached {
                        Some(upload_id) => upload_id,
                        None => {
                            let upload_id = client
                                .upload_file(file)
                                .await
                                .map_err(TaskFailure::from)?;
                            cache.lock().await.insert(file.file_id, upload_id.clone());
                            upload_id
                        }
                    };
                    uploads.push(upload_id);
                }
                Ok(uploads)
            }));
        }

        let ctx = self.stage_context(Stage::Upload, batch, deadline);
        let pass = pool::run_stage(&ctx, tasks).await;
        Self::apply_pass(ledger, pass, |artifacts, uploads| {
            artifacts.uploaded = Some(uploads);
        })
    }

    async fn run_create(
        &self,
        batch: &Batch,
        records: &HashMap<SourceScanId, Arc<ScanRecord>>,
        ledger: &mut BTreeMap<SourceScanId, ScanArtifacts>,
        deadline: Instant,
    ) -> StageResult {
        let target_store_id = self.target_store_id;
        let captured_at = self.captured_at;

        let mut tasks = Vec::new();
        for (&scan_id, artifacts) in ledger.iter() {
            if artifacts.unprocessable || artifacts.created.is_some() {
                continue;
            }
            let Some(uploads) = artifacts.uploaded.clone() else {
                continue;
            };
            let Some(record) = records.get(&scan_id).cloned() else {
                continue;
            };
            let client = self.client.clone();
            tasks.push(StageTask::new(scan_id, async move {
                let Some(payload) = record.create_payload(target_store_id, captured_at, &uploads)
                else {
                    return Err(TaskFailure::MissingData {
                        context: "scan payload is not an object".to_string(),
                    });
                };
                client
                    .create_scan(&payload)
                    .await
                    .map_err(TaskFailure::from)
            }));
        }

        let ctx = self.stage_context(Stage::Create, batch, deadline);
        let pass = pool::run_stage(&ctx, tasks).await;
        Self::apply_pass(ledger, pass, |artifacts, target_id| {
            artifacts.created = Some(target_id);
        })
    }

    /// Folds a stage pass back into the ledger: outputs advance their
    /// scan, failures are remembered for logging and the next attempt.
    fn apply_pass<T>(
        ledger: &mut BTreeMap<SourceScanId, ScanArtifacts>,
        pass: StagePass<T>,
        mut store_output: impl FnMut(&mut ScanArtifacts, T),
    ) -> StageResult {
        for (scan_id, output) in pass.outputs {
            if let Some(artifacts) = ledger.get_mut(&scan_id) {
                store_output(artifacts, output);
                artifacts.failure = None;
            }
        }
        for (scan_id, cause) in pass.failures {
            if let Some(artifacts) = ledger.get_mut(&scan_id) {
                if matches!(cause, TaskFailure::MissingData { .. }) {
                    artifacts.unprocessable = true;
                }
                artifacts.failure = Some(cause);
            }
        }
        pass.result
    }

    fn terminal_outcome(&self, ledger: &BTreeMap<SourceScanId, ScanArtifacts>) -> BatchOutcome {
        if ledger.values().all(|a| a.created.is_some()) {
            BatchOutcome::Completed
        } else {
            BatchOutcome::PartiallyFailed
        }
    }

    fn mark_budget_exhausted(
        &self,
        ledger: &mut BTreeMap<SourceScanId, ScanArtifacts>,
        batch: &Batch,
    ) {
        warn!(
            batch = batch.batch_number,
            budget_secs = self.config.batch_budget.as_secs(),
            "Batch budget exhausted, aborting remaining work"
        );
        for artifacts in ledger.values_mut() {
            if artifacts.created.is_none() && !artifacts.unprocessable {
                artifacts.failure = Some(TaskFailure::TimedOut);
            }
        }
    }

    fn finish_batch(
        &self,
        batch: &Batch,
        ledger: BTreeMap<SourceScanId, ScanArtifacts>,
        outcome: BatchOutcome,
    ) -> BatchReport {
        // Mapping entries keep the batch's input order.
        let mappings: Vec<ScanMapping> = batch
            .scan_ids
            .iter()
            .filter_map(|scan_id| {
                ledger
                    .get(scan_id)
                    .and_then(|a| a.created)
                    .map(|target_scan_id| ScanMapping {
                        source_scan_id: *scan_id,
                        target_scan_id,
                    })
            })
            .collect();
        let succeeded = mappings.len();
        let failed = (batch.len() - succeeded) as u64;

        if outcome.is_terminal() {
            for (scan_id, artifacts) in &ledger {
                if artifacts.created.is_none()
                    && let Some(cause) = &artifacts.failure
                {
                    warn!(
                        scan = %scan_id,
                        batch = batch.batch_number,
                        cause = %cause,
                        "Scan failed"
                    );
                }
            }
            info!(
                batch = batch.batch_number,
                succeeded,
                failed,
                outcome = %outcome,
                "Batch finished"
            );
            self.events.emit(CopyEvent::BatchCompleted {
                batch_number: batch.batch_number,
                total_batches: batch.total_batches,
                succeeded,
                failed: failed as usize,
                outcome,
                timestamp: Utc::now(),
            });
        }

        BatchReport {
            batch_number: batch.batch_number,
            outcome,
            mappings,
            failed,
        }
    }
}
