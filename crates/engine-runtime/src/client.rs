use async_trait::async_trait;
use engine_core::retry::RetryDisposition;
use model::core::identifiers::{SourceScanId, TargetScanId, UploadId};
use model::execution::stage::TaskFailure;
use model::records::scan::{DownloadedFile, ScanImage, ScanRecord};
use thiserror::Error;

/// Errors reported by a transfer client after its own task-level retries
/// are spent. Request/response context travels with the error so every
/// failure can be logged with its payload.
#[derive(Debug, Clone, Error)]
pub enum TransferError {
    #[error("HTTP {status}: {context}")]
    Http { status: u16, context: String },

    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote answered but the body was not what the API promises
    /// (missing fields, null document).
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Other(String),
}

impl TransferError {
    pub fn is_transient(&self) -> bool {
        classify_transfer_error(self) == RetryDisposition::Retry
    }
}

/// Decides whether a transfer error is worth another task-level attempt.
/// Gateway churn and dropped connections are; malformed requests and
/// responses are not.
pub fn classify_transfer_error(err: &TransferError) -> RetryDisposition {
    match err {
        TransferError::Http { status, .. } => match status {
            408 | 429 | 502 | 503 | 504 => RetryDisposition::Retry,
            _ => RetryDisposition::Stop,
        },
        TransferError::Connection(_) => RetryDisposition::Retry,
        TransferError::InvalidResponse(_) => RetryDisposition::Stop,
        TransferError::Other(_) => RetryDisposition::Stop,
    }
}

impl From<TransferError> for TaskFailure {
    fn from(err: TransferError) -> Self {
        TaskFailure::Transfer {
            transient: err.is_transient(),
            context: err.to_string(),
        }
    }
}

/// The task-execution contract the engine drives. Implementations own
/// authentication, wire formats and task-level retry
/// (`engine_core::retry::RetryPolicy` with [`classify_transfer_error`]);
/// the engine only ever sees the final outcome of each call.
#[async_trait]
pub trait ScanTransferClient: Send + Sync {
    /// Fetches scan metadata (create payload plus file list) from the
    /// source instance for the given ids. Ids unknown to the source are
    /// simply absent from the result.
    async fn fetch_scan_records(
        &self,
        scan_ids: &[SourceScanId],
    ) -> Result<Vec<ScanRecord>, TransferError>;

    /// Fetches one image from the source instance.
    async fn download_file(
        &self,
        scan_id: SourceScanId,
        image: &ScanImage,
    ) -> Result<DownloadedFile, TransferError>;

    /// Pushes one image to the target instance.
    async fn upload_file(&self, file: &DownloadedFile) -> Result<UploadId, TransferError>;

    /// Creates the scan in the target instance from a fully assembled
    /// payload, returning the new scan's id.
    async fn create_scan(&self, payload: &serde_json::Value)
    -> Result<TargetScanId, TransferError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_are_transient() {
        for status in [502, 503, 504, 429, 408] {
            let err = TransferError::Http {
                status,
                context: "upstream".into(),
            };
            assert!(err.is_transient(), "status {status}");
        }
        assert!(TransferError::Connection("reset".into()).is_transient());
    }

    #[test]
    fn request_errors_are_final() {
        let bad_request = TransferError::Http {
            status: 400,
            context: "missing field 'store'".into(),
        };
        assert!(!bad_request.is_transient());
        assert!(!TransferError::InvalidResponse("null body".into()).is_transient());
    }

    #[test]
    fn task_failure_keeps_the_request_context() {
        let err = TransferError::Http {
            status: 400,
            context: "payload {\"store\": null}".into(),
        };
        let failure = TaskFailure::from(err);
        match failure {
            TaskFailure::Transfer { transient, context } => {
                assert!(!transient);
                assert!(context.contains("payload"));
            }
            other => panic!("unexpected failure: {other:?}"),
        }
    }
}
