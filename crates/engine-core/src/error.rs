use model::execution::stage::Stage;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from checkpoint persistence.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Failed to access checkpoint {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The on-disk document exists but does not parse into a complete
    /// checkpoint. Never silently downgraded to an empty checkpoint;
    /// resuming requires an explicit restart.
    #[error("Corrupt checkpoint {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to encode checkpoint: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Configuration errors, surfaced before any batch starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Batch size must be at least 1")]
    InvalidBatchSize,

    #[error("Worker limit for the {stage} stage must be at least 1")]
    InvalidWorkerLimit { stage: Stage },

    #[error("Retry threshold for the {stage} stage must be within (0, 1], got {value}")]
    InvalidThreshold { stage: Stage, value: f64 },

    #[error("{name} must be a positive duration")]
    InvalidDuration { name: &'static str },
}
