use engine_runtime::error::CopyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read the configuration file: {0}")]
    ConfigFileRead(#[from] std::io::Error),

    #[error("Failed to parse the configuration file: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Failed to serialize the report to JSON: {0}")]
    JsonSerialize(serde_json::Error),

    #[error("Invalid scan id list: {0}")]
    InvalidScanIds(String),

    #[error(
        "Found {count} checkpoint file(s) in {dir}; pass --resume, --restart, or --checkpoint <file>"
    )]
    CheckpointChoiceRequired { count: usize, dir: String },

    #[error("Copy engine error: {0}")]
    Copy(#[from] CopyError),
}
