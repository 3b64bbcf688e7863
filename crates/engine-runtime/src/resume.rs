use crate::error::CopyError;
use chrono::Utc;
use engine_core::state::CheckpointStore;
use engine_core::state::json_store::JsonCheckpointStore;
use engine_core::state::models::Checkpoint;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::info;

const CHECKPOINT_PREFIX: &str = "checkpoint_";
const CHECKPOINT_SUFFIX: &str = ".json";

/// Finds checkpoints left by earlier runs and turns the caller's
/// resume-or-restart choice into the checkpoint a new run starts from.
/// Multiple candidates are never merged or silently picked between.
pub struct ResumeController {
    dir: PathBuf,
}

impl ResumeController {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Checkpoint file candidates in `dir`, most recently modified
    /// first. A missing directory simply has no candidates.
    pub fn discover(&self) -> Result<Vec<PathBuf>, CopyError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(CopyError::CheckpointDiscovery {
                    dir: self.dir.clone(),
                    source: err,
                });
            }
        };

        let mut candidates: Vec<(SystemTime, PathBuf)> = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| CopyError::CheckpointDiscovery {
                dir: self.dir.clone(),
                source: err,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(CHECKPOINT_PREFIX) || !name.ends_with(CHECKPOINT_SUFFIX) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            candidates.push((modified, entry.path()));
        }

        candidates.sort_by(|a, b| b.cmp(a));
        Ok(candidates.into_iter().map(|(_, path)| path).collect())
    }

    /// Loads an explicitly chosen checkpoint. Corruption is surfaced,
    /// never repaired or ignored.
    pub async fn load(&self, path: &Path) -> Result<Checkpoint, CopyError> {
        let store = JsonCheckpointStore::new(path);
        let checkpoint = store
            .load()
            .await?
            .ok_or_else(|| CopyError::MissingCheckpoint {
                path: path.to_path_buf(),
            })?;
        info!(
            path = %path.display(),
            batches = checkpoint.completed_batches.len(),
            mapped = checkpoint.mapped_count(),
            failed = checkpoint.failed_scans,
            "Resuming from checkpoint"
        );
        Ok(checkpoint)
    }

    /// Resumes from the single discovered checkpoint. With none there is
    /// nothing to resume; with several the ambiguity goes back to the
    /// caller for an explicit choice.
    pub async fn resume_latest(&self) -> Result<(PathBuf, Checkpoint), CopyError> {
        let mut candidates = self.discover()?;
        match candidates.len() {
            0 => Err(CopyError::MissingCheckpoint {
                path: self.dir.clone(),
            }),
            1 => {
                let path = candidates.remove(0);
                let checkpoint = self.load(&path).await?;
                Ok((path, checkpoint))
            }
            _ => Err(CopyError::AmbiguousCheckpoints { candidates }),
        }
    }

    /// Deletes every discovered checkpoint and hands back a blank slate.
    pub fn restart(&self) -> Result<Checkpoint, CopyError> {
        for path in self.discover()? {
            match std::fs::remove_file(&path) {
                Ok(()) => info!(path = %path.display(), "Removed checkpoint for restart"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(CopyError::CheckpointDiscovery {
                        dir: self.dir.clone(),
                        source: err,
                    });
                }
            }
        }
        Ok(Checkpoint::empty())
    }

    /// Run-scoped path for a fresh run's checkpoint.
    pub fn new_checkpoint_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        self.dir.join(format!("{CHECKPOINT_PREFIX}{stamp}{CHECKPOINT_SUFFIX}"))
    }
}
