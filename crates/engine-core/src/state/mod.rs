use crate::error::StateError;
use crate::state::models::Checkpoint;
use async_trait::async_trait;
use std::path::Path;

pub mod json_store;
pub mod models;

/// Durable storage for run progress. One store owns one checkpoint path
/// for the lifetime of a run; concurrent runs against the same path are
/// the caller's responsibility to prevent.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    fn path(&self) -> &Path;

    /// Missing file is a fresh start (`None`); an unreadable or
    /// incomplete document is `StateError::Corrupt`.
    async fn load(&self) -> Result<Option<Checkpoint>, StateError>;

    /// Persists atomically: the on-disk file is always either the
    /// previous or the new complete state.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), StateError>;

    /// Deletes the checkpoint file. Removing an already-absent file is
    /// not an error.
    async fn remove(&self) -> Result<(), StateError>;
}
