use crate::client::TransferError;
use engine_core::error::{ConfigError, StateError};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level errors for the scan copy engine.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    State(#[from] StateError),

    /// Fetching scan metadata happens before the first batch; a failure
    /// here aborts the run outright.
    #[error("Failed to fetch scan records from the source: {0}")]
    Fetch(#[source] TransferError),

    #[error("No checkpoint found at {}", path.display())]
    MissingCheckpoint { path: PathBuf },

    /// Several checkpoint files match the run-scoped pattern; the engine
    /// never merges or guesses, the caller must pick one.
    #[error("Found {} checkpoint candidates; resume requires an explicit choice", candidates.len())]
    AmbiguousCheckpoints { candidates: Vec<PathBuf> },

    #[error("Failed to scan checkpoint directory {}: {source}", dir.display())]
    CheckpointDiscovery {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
