use crate::client::{ScanTransferClient, TransferError};
use async_trait::async_trait;
use model::core::identifiers::{FileId, SourceScanId, TargetScanId, UploadId};
use model::records::scan::{DownloadedFile, ScanImage, ScanRecord};
use serde_json::json;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Deterministic in-memory transfer client for rehearsing runs: it
/// synthesizes scan records on the fly and can be told to fail every
/// n-th transfer call with a gateway error. No randomness, so a given
/// configuration always produces the same run shape.
pub struct SimulatedTransferClient {
    latency: Duration,
    fail_every: Option<u64>,
    calls: AtomicU64,
    next_target: AtomicI64,
    next_upload: AtomicU64,
}

impl Default for SimulatedTransferClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTransferClient {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(25),
            fail_every: None,
            calls: AtomicU64::new(0),
            next_target: AtomicI64::new(1),
            next_upload: AtomicU64::new(1),
        }
    }

    /// Artificial per-call latency, so progress output is watchable.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every n-th transfer call fail with a simulated 503.
    pub fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    async fn simulate_call(&self, op: &str) -> Result<(), TransferError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(n) = self.fail_every
            && call % n == 0
        {
            return Err(TransferError::Http {
                status: 503,
                context: format!("simulated gateway error on {op} (call {call})"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ScanTransferClient for SimulatedTransferClient {
    async fn fetch_scan_records(
        &self,
        scan_ids: &[SourceScanId],
    ) -> Result<Vec<ScanRecord>, TransferError> {
        const SECTIONS: [&str; 3] = ["Beverages", "Snacks", "Dairy"];

        Ok(scan_ids
            .iter()
            .enumerate()
            .map(|(idx, &id)| {
                let section = SECTIONS[idx % SECTIONS.len()];
                ScanRecord {
                    id,
                    provided_values: json!({
                        "_raw_data": {
                            "store": 1,
                            "section": section,
                            "store_planogram": id.value() * 7,
                        }
                    }),
                    files: vec![ScanImage {
                        file_id: FileId::new(id.value() * 100),
                        original_filename: format!("scan_{id}.jpg"),
                        section_name: Some(section.to_string()),
                        store_pog_id: Some(id.value() * 7),
                    }],
                    section_name: Some(section.to_string()),
                }
            })
            .collect())
    }

    async fn download_file(
        &self,
        scan_id: SourceScanId,
        image: &ScanImage,
    ) -> Result<DownloadedFile, TransferError> {
        self.simulate_call("download").await?;
        Ok(DownloadedFile {
            file_id: image.file_id,
            file_name: image.file_name(scan_id),
            content: vec![0u8; 256],
        })
    }

    async fn upload_file(&self, _file: &DownloadedFile) -> Result<UploadId, TransferError> {
        self.simulate_call("upload").await?;
        let n = self.next_upload.fetch_add(1, Ordering::SeqCst);
        Ok(UploadId::new(format!("sim-upload-{n}")))
    }

    async fn create_scan(
        &self,
        _payload: &serde_json::Value,
    ) -> Result<TargetScanId, TransferError> {
        self.simulate_call("create").await?;
        Ok(TargetScanId::new(
            9000 + self.next_target.fetch_add(1, Ordering::SeqCst),
        ))
    }
}
