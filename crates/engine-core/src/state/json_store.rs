use crate::error::StateError;
use crate::state::{CheckpointStore, models::Checkpoint};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File-backed checkpoint store. The document is pretty-printed JSON
/// with the documented field names, written to a sibling temp file and
/// renamed into place so a crash mid-write cannot leave a partial
/// checkpoint behind.
pub struct JsonCheckpointStore {
    path: PathBuf,
}

impl JsonCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_err(&self, source: std::io::Error) -> StateError {
        StateError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl CheckpointStore for JsonCheckpointStore {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Option<Checkpoint>, StateError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.io_err(err)),
        };

        let checkpoint: Checkpoint =
            serde_json::from_str(&text).map_err(|err| StateError::Corrupt {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;

        debug!(
            path = %self.path.display(),
            batches = checkpoint.completed_batches.len(),
            mapped = checkpoint.mapped_count(),
            failed = checkpoint.failed_scans,
            "Loaded checkpoint"
        );
        Ok(Some(checkpoint))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StateError> {
        let json = serde_json::to_string_pretty(checkpoint).map_err(StateError::Encode)?;

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|err| self.io_err(err))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| self.io_err(err))?;

        debug!(
            path = %self.path.display(),
            batches = checkpoint.completed_batches.len(),
            "Saved checkpoint"
        );
        Ok(())
    }

    async fn remove(&self) -> Result<(), StateError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(self.io_err(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::models::ScanMapping;
    use model::core::identifiers::{SourceScanId, TargetScanId};
    use tempfile::tempdir;

    fn sample_checkpoint() -> Checkpoint {
        let mut cp = Checkpoint::empty();
        cp.record_batch(
            1,
            [
                ScanMapping {
                    source_scan_id: SourceScanId::new(3),
                    target_scan_id: TargetScanId::new(30),
                },
                ScanMapping {
                    source_scan_id: SourceScanId::new(1),
                    target_scan_id: TargetScanId::new(10),
                },
            ],
            2,
        );
        cp.record_batch(2, [], 0);
        cp
    }

    #[tokio::test]
    async fn save_then_load_round_trips_exactly() {
        let dir = tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path().join("checkpoint_test.json"));
        let cp = sample_checkpoint();

        store.save(&cp).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();

        // Mapping order is insertion order, not id order.
        assert_eq!(loaded, cp);
        assert!(!store.tmp_path().exists(), "temp file left behind");
    }

    #[tokio::test]
    async fn missing_file_is_a_fresh_start() {
        let dir = tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path().join("checkpoint_none.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_document_is_corrupt_not_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint_bad.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let store = JsonCheckpointStore::new(&path);
        assert!(matches!(
            store.load().await,
            Err(StateError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn document_missing_a_required_field_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("checkpoint_partial.json");
        tokio::fs::write(&path, r#"{"completed_batches": [1], "scan_mapping": []}"#)
            .await
            .unwrap();

        let store = JsonCheckpointStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(err.to_string().contains("failed_scans"), "{err}");
    }

    #[tokio::test]
    async fn save_replaces_previous_state_atomically() {
        let dir = tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path().join("checkpoint_seq.json"));

        let mut cp = Checkpoint::empty();
        cp.record_batch(1, [], 0);
        store.save(&cp).await.unwrap();

        cp.record_batch(2, [], 1);
        store.save(&cp).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.completed_batches.len(), 2);
        assert_eq!(loaded.failed_scans, 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = JsonCheckpointStore::new(dir.path().join("checkpoint_rm.json"));

        store.save(&Checkpoint::empty()).await.unwrap();
        store.remove().await.unwrap();
        store.remove().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
