use crate::client::ScanTransferClient;
use crate::error::CopyError;
use crate::execution::orchestrator::{BatchOrchestrator, OrchestratorParams};
use chrono::Utc;
use engine_core::config::RunConfig;
use engine_core::events::EventSink;
use engine_core::state::CheckpointStore;
use engine_core::state::models::{Checkpoint, ScanMapping};
use model::core::identifiers::{RunId, SourceScanId};
use model::events::copy::CopyEvent;
use model::records::batch::plan_batches;
use model::records::scan::ScanRecord;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Inputs for one copy run. The checkpoint is whatever the resume
/// controller decided to start from: empty for a fresh run, loaded from
/// disk for a resumed one.
pub struct CopyRunParams {
    pub scan_ids: Vec<SourceScanId>,
    pub target_store_id: i64,
    pub captured_at: i64,
    pub config: RunConfig,
    pub checkpoint: Checkpoint,
    pub client: Arc<dyn ScanTransferClient>,
    pub store: Arc<dyn CheckpointStore>,
    pub cancel: CancellationToken,
    pub events: EventSink,
}

/// Final accounting for a run, reported whatever happened along the way.
#[derive(Debug)]
pub struct RunSummary {
    pub run_id: RunId,
    pub succeeded: usize,
    pub failed: u64,
    pub mapping: Vec<ScanMapping>,
    /// `None` after a fully clean run, whose checkpoint is deleted.
    pub checkpoint_path: Option<PathBuf>,
    pub cancelled: bool,
}

/// Runs the whole copy: plan, fetch, drive each pending batch through
/// the orchestrator, persist the checkpoint after every terminal batch.
/// Batches already present in the checkpoint are skipped untouched.
pub async fn run(params: CopyRunParams) -> Result<RunSummary, CopyError> {
    params.config.validate()?;

    let CopyRunParams {
        scan_ids,
        target_store_id,
        captured_at,
        config,
        mut checkpoint,
        client,
        store,
        cancel,
        events,
    } = params;

    let run_id = RunId::new(format!("run-{}", Uuid::new_v4()));
    let batches = plan_batches(&scan_ids, config.batch_size);
    let total_batches = batches.first().map(|b| b.total_batches).unwrap_or(0);

    info!(
        run = %run_id,
        scans = scan_ids.len(),
        batches = total_batches,
        resumed_batches = checkpoint.completed_batches.len(),
        checkpoint = %store.path().display(),
        "Starting copy run"
    );
    events.emit(CopyEvent::RunStarted {
        run_id: run_id.clone(),
        total_scans: scan_ids.len(),
        total_batches,
        timestamp: Utc::now(),
    });

    let records = fetch_pending_records(&client, &batches, &checkpoint).await?;

    let orchestrator = BatchOrchestrator::new(OrchestratorParams {
        client,
        config,
        target_store_id,
        captured_at,
        cancel: cancel.clone(),
        events: events.clone(),
    });

    let mut cancelled = false;
    for batch in &batches {
        if checkpoint.is_batch_completed(batch.batch_number) {
            info!(
                batch = batch.batch_number,
                total = batch.total_batches,
                "Batch already completed, skipping"
            );
            continue;
        }
        if cancel.is_cancelled() {
            cancelled = true;
            break;
        }

        let report = orchestrator.process_batch(batch, &records).await;
        if !report.outcome.is_terminal() {
            // The in-flight batch stays out of the checkpoint and will
            // be re-run on resume.
            cancelled = true;
            break;
        }

        checkpoint.record_batch(report.batch_number, report.mappings, report.failed);
        store.save(&checkpoint).await?;
    }

    let all_done = !cancelled
        && batches
            .iter()
            .all(|b| checkpoint.is_batch_completed(b.batch_number));
    let clean = all_done && checkpoint.failed_scans == 0;

    let checkpoint_path = if clean {
        store.remove().await?;
        None
    } else {
        Some(store.path().to_path_buf())
    };

    if cancelled {
        warn!(run = %run_id, "Run cancelled, completed batches are checkpointed");
        events.emit(CopyEvent::RunCancelled {
            run_id: run_id.clone(),
            timestamp: Utc::now(),
        });
    }

    let checkpoint_display = checkpoint_path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "removed (clean run)".to_string());
    info!(
        run = %run_id,
        succeeded = checkpoint.mapped_count(),
        failed = checkpoint.failed_scans,
        checkpoint = %checkpoint_display,
        "Copy run finished"
    );
    events.emit(CopyEvent::RunCompleted {
        run_id: run_id.clone(),
        succeeded: checkpoint.mapped_count(),
        failed: checkpoint.failed_scans,
        checkpoint: checkpoint_path
            .as_deref()
            .map(|p| p.display().to_string()),
        timestamp: Utc::now(),
    });

    Ok(RunSummary {
        run_id,
        succeeded: checkpoint.mapped_count(),
        failed: checkpoint.failed_scans,
        mapping: checkpoint.scan_mapping,
        checkpoint_path,
        cancelled,
    })
}

/// Fetches metadata for scans in batches the checkpoint has not yet
/// completed. Completed batches never touch the source again.
async fn fetch_pending_records(
    client: &Arc<dyn ScanTransferClient>,
    batches: &[model::records::batch::Batch],
    checkpoint: &Checkpoint,
) -> Result<HashMap<SourceScanId, Arc<ScanRecord>>, CopyError> {
    let pending_ids: Vec<SourceScanId> = batches
        .iter()
        .filter(|b| !checkpoint.is_batch_completed(b.batch_number))
        .flat_map(|b| b.scan_ids.iter().copied())
        .collect();

    if pending_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let records = client
        .fetch_scan_records(&pending_ids)
        .await
        .map_err(CopyError::Fetch)?;
    info!(
        requested = pending_ids.len(),
        fetched = records.len(),
        "Fetched scan records from source"
    );

    Ok(records
        .into_iter()
        .map(|record| (record.id, Arc::new(record)))
        .collect())
}
