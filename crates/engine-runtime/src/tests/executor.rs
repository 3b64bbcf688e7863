//! End-to-end runs of the executor against an in-memory client and a
//! real on-disk checkpoint store.

use crate::client::{ScanTransferClient, TransferError};
use crate::error::CopyError;
use crate::execution::executor::{self, CopyRunParams};
use async_trait::async_trait;
use engine_core::config::RunConfig;
use engine_core::error::ConfigError;
use engine_core::events::EventSink;
use engine_core::state::json_store::JsonCheckpointStore;
use engine_core::state::models::Checkpoint;
use engine_core::state::CheckpointStore;
use model::core::identifiers::{FileId, SourceScanId, TargetScanId, UploadId};
use model::records::scan::{DownloadedFile, ScanImage, ScanRecord};
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Minimal client that records what the executor asked of it. The scan
/// id is threaded through the create payload so create calls can be
/// attributed to their scan.
#[derive(Default)]
struct RecordingClient {
    fail_fetch: bool,
    fail_create: Vec<i64>,
    cancel_on_create: Mutex<Option<(i64, CancellationToken)>>,
    fetched: Mutex<Vec<SourceScanId>>,
    created: Mutex<Vec<i64>>,
}

#[async_trait]
impl ScanTransferClient for RecordingClient {
    async fn fetch_scan_records(
        &self,
        scan_ids: &[SourceScanId],
    ) -> Result<Vec<ScanRecord>, TransferError> {
        if self.fail_fetch {
            return Err(TransferError::Connection("source unreachable".into()));
        }
        self.fetched.lock().await.extend_from_slice(scan_ids);
        Ok(scan_ids
            .iter()
            .map(|&id| ScanRecord {
                id,
                provided_values: json!({
                    "_raw_data": { "source": id.value(), "store": 1 }
                }),
                files: vec![ScanImage {
                    file_id: FileId::new(id.value() * 100),
                    original_filename: "shelf.jpg".to_string(),
                    section_name: None,
                    store_pog_id: None,
                }],
                section_name: None,
            })
            .collect())
    }

    async fn download_file(
        &self,
        _scan_id: SourceScanId,
        image: &ScanImage,
    ) -> Result<DownloadedFile, TransferError> {
        Ok(DownloadedFile {
            file_id: image.file_id,
            file_name: "shelf.jpg".to_string(),
            content: vec![0u8; 16],
        })
    }

    async fn upload_file(&self, file: &DownloadedFile) -> Result<UploadId, TransferError> {
        Ok(UploadId::new(format!("upl-{}", file.file_id)))
    }

    async fn create_scan(
        &self,
        payload: &serde_json::Value,
    ) -> Result<TargetScanId, TransferError> {
        let source = payload["source"].as_i64().unwrap_or_default();
        self.created.lock().await.push(source);

        if let Some((trigger, token)) = self.cancel_on_create.lock().await.as_ref()
            && *trigger == source
        {
            token.cancel();
        }
        if self.fail_create.contains(&source) {
            return Err(TransferError::Http {
                status: 400,
                context: format!("rejected payload for scan {source}"),
            });
        }
        Ok(TargetScanId::new(source + 1000))
    }
}

fn fast_config(checkpoint_dir: &std::path::Path) -> RunConfig {
    RunConfig {
        retry_base_delay: Duration::ZERO,
        checkpoint_dir: checkpoint_dir.to_path_buf(),
        ..RunConfig::default()
    }
}

fn params(
    scan_ids: Vec<SourceScanId>,
    config: RunConfig,
    checkpoint: Checkpoint,
    client: Arc<RecordingClient>,
    store: Arc<JsonCheckpointStore>,
    cancel: CancellationToken,
) -> CopyRunParams {
    CopyRunParams {
        scan_ids,
        target_store_id: 7,
        captured_at: 1_700_000_000,
        config,
        checkpoint,
        client,
        store,
        cancel,
        events: EventSink::disabled(),
    }
}

fn ids(range: std::ops::RangeInclusive<i64>) -> Vec<SourceScanId> {
    range.map(SourceScanId::new).collect()
}

#[tokio::test]
async fn resume_processes_only_pending_batches() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonCheckpointStore::new(dir.path().join("checkpoint_resume.json")));
    let client = Arc::new(RecordingClient::default());

    // Batches 1 and 2 of a 5-batch plan are already done; batch 2
    // recorded one failure, so the run can never be "clean" and the
    // checkpoint must survive.
    let mut checkpoint = Checkpoint::empty();
    checkpoint.record_batch(1, [], 0);
    checkpoint.record_batch(2, [], 1);

    let summary = executor::run(params(
        ids(1..=50),
        fast_config(dir.path()),
        checkpoint,
        client.clone(),
        store.clone(),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(*client.fetched.lock().await, ids(21..=50));
    let mut created = client.created.lock().await.clone();
    created.sort_unstable();
    assert_eq!(created, (21..=50).collect::<Vec<i64>>());

    assert!(!summary.cancelled);
    assert_eq!(summary.succeeded, 30);
    assert_eq!(summary.failed, 1);
    assert!(summary.checkpoint_path.is_some());

    let on_disk = store.load().await.unwrap().unwrap();
    assert_eq!(on_disk.completed_batches, BTreeSet::from([1, 2, 3, 4, 5]));
    assert_eq!(on_disk.mapped_count(), 30);
}

#[tokio::test]
async fn cancellation_checkpoints_only_terminal_batches() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonCheckpointStore::new(dir.path().join("checkpoint_cancel.json")));
    let cancel = CancellationToken::new();

    // Scan 15 sits in batch 2; creating it cancels the run mid-batch.
    let client = Arc::new(RecordingClient {
        cancel_on_create: Mutex::new(Some((15, cancel.clone()))),
        ..RecordingClient::default()
    });

    let summary = executor::run(params(
        ids(1..=30),
        fast_config(dir.path()),
        Checkpoint::empty(),
        client,
        store.clone(),
        cancel,
    ))
    .await
    .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.succeeded, 10, "only batch 1 is recorded");

    let on_disk = store.load().await.unwrap().unwrap();
    assert_eq!(on_disk.completed_batches, BTreeSet::from([1]));
    assert!(
        !on_disk.is_batch_completed(2),
        "in-flight batch must not be checkpointed"
    );
}

#[tokio::test]
async fn partially_failed_batches_are_still_checkpointed() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonCheckpointStore::new(dir.path().join("checkpoint_partial.json")));

    // Creates for scans 1..6 always fail: batch 1 creates 4/10 (below
    // the 0.50 threshold), exhausts its retries and ends partial. The
    // run must still record it and carry on with batch 2.
    let client = Arc::new(RecordingClient {
        fail_create: (1..=6).collect(),
        ..RecordingClient::default()
    });

    let summary = executor::run(params(
        ids(1..=20),
        fast_config(dir.path()),
        Checkpoint::empty(),
        client,
        store.clone(),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert!(!summary.cancelled);
    assert_eq!(summary.succeeded, 14);
    assert_eq!(summary.failed, 6);
    assert!(summary.checkpoint_path.is_some());

    let on_disk = store.load().await.unwrap().unwrap();
    assert_eq!(on_disk.completed_batches, BTreeSet::from([1, 2]));
    assert_eq!(on_disk.failed_scans, 6);
}

#[tokio::test]
async fn clean_run_removes_its_checkpoint() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonCheckpointStore::new(dir.path().join("checkpoint_clean.json")));
    let client = Arc::new(RecordingClient::default());

    let summary = executor::run(params(
        ids(1..=10),
        fast_config(dir.path()),
        Checkpoint::empty(),
        client,
        store.clone(),
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 10);
    assert_eq!(summary.failed, 0);
    assert!(summary.checkpoint_path.is_none());
    assert!(store.load().await.unwrap().is_none());

    // Mapping preserves input order.
    let sources: Vec<i64> = summary
        .mapping
        .iter()
        .map(|m| m.source_scan_id.value())
        .collect();
    assert_eq!(sources, (1..=10).collect::<Vec<i64>>());
}

#[tokio::test]
async fn invalid_config_fails_before_any_transfer() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonCheckpointStore::new(dir.path().join("checkpoint_cfg.json")));
    let client = Arc::new(RecordingClient::default());
    let config = RunConfig {
        batch_size: 0,
        ..fast_config(dir.path())
    };

    let result = executor::run(params(
        ids(1..=10),
        config,
        Checkpoint::empty(),
        client.clone(),
        store,
        CancellationToken::new(),
    ))
    .await;

    assert!(matches!(
        result,
        Err(CopyError::Config(ConfigError::InvalidBatchSize))
    ));
    assert!(client.fetched.lock().await.is_empty());
}

#[tokio::test]
async fn fetch_failure_aborts_the_run() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonCheckpointStore::new(dir.path().join("checkpoint_fetch.json")));
    let client = Arc::new(RecordingClient {
        fail_fetch: true,
        ..RecordingClient::default()
    });

    let result = executor::run(params(
        ids(1..=10),
        fast_config(dir.path()),
        Checkpoint::empty(),
        client,
        store,
        CancellationToken::new(),
    ))
    .await;

    assert!(matches!(result, Err(CopyError::Fetch(_))));
}

#[tokio::test]
async fn empty_input_completes_with_zero_batches() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonCheckpointStore::new(dir.path().join("checkpoint_empty.json")));
    let client = Arc::new(RecordingClient::default());

    let summary = executor::run(params(
        Vec::new(),
        fast_config(dir.path()),
        Checkpoint::empty(),
        client.clone(),
        store,
        CancellationToken::new(),
    ))
    .await
    .unwrap();

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 0);
    assert!(client.fetched.lock().await.is_empty());
}
