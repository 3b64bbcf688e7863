use crate::error::CliError;
use engine_core::config::RunConfig;
use serde::Deserialize;
use std::time::Duration;

/// Optional overrides for the engine configuration, loaded from a JSON
/// file. Anything not set keeps its default; unknown keys are rejected
/// so typos fail loudly instead of silently running with defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfigOverrides {
    pub batch_size: Option<usize>,
    pub download_workers: Option<usize>,
    pub upload_workers: Option<usize>,
    pub create_workers: Option<usize>,
    pub download_threshold: Option<f64>,
    pub upload_threshold: Option<f64>,
    pub create_threshold: Option<f64>,
    pub max_batch_retries: Option<u32>,
    pub retry_base_delay_secs: Option<u64>,
    pub batch_budget_secs: Option<u64>,
    pub download_meta_timeout_secs: Option<u64>,
    pub download_content_timeout_secs: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
    pub create_timeout_secs: Option<u64>,
}

impl RunConfigOverrides {
    pub fn apply(self, mut config: RunConfig) -> RunConfig {
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.download_workers {
            config.download_workers = v;
        }
        if let Some(v) = self.upload_workers {
            config.upload_workers = v;
        }
        if let Some(v) = self.create_workers {
            config.create_workers = v;
        }
        if let Some(v) = self.download_threshold {
            config.download_threshold = v;
        }
        if let Some(v) = self.upload_threshold {
            config.upload_threshold = v;
        }
        if let Some(v) = self.create_threshold {
            config.create_threshold = v;
        }
        if let Some(v) = self.max_batch_retries {
            config.max_batch_retries = v;
        }
        if let Some(v) = self.retry_base_delay_secs {
            config.retry_base_delay = Duration::from_secs(v);
        }
        if let Some(v) = self.batch_budget_secs {
            config.batch_budget = Duration::from_secs(v);
        }
        if let Some(v) = self.download_meta_timeout_secs {
            config.download_meta_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.download_content_timeout_secs {
            config.download_content_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.upload_timeout_secs {
            config.upload_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.create_timeout_secs {
            config.create_timeout = Duration::from_secs(v);
        }
        config
    }
}

pub async fn load_overrides(path: &str) -> Result<RunConfigOverrides, CliError> {
    let text = tokio::fs::read_to_string(path).await?;
    let overrides = serde_json::from_str(&text)?;
    Ok(overrides)
}
