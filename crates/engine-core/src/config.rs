use crate::batch_policy::BatchRetryPolicy;
use crate::error::ConfigError;
use model::execution::stage::Stage;
use std::path::PathBuf;
use std::time::Duration;

/// Immutable engine configuration, validated once before the first batch.
/// The engine does no configuration I/O of its own; callers build this
/// from whatever surface they expose.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Scans per batch; the last batch may be smaller.
    pub batch_size: usize,

    /// Concurrency ceiling per stage.
    pub download_workers: usize,
    pub upload_workers: usize,
    pub create_workers: usize,

    /// Success-rate floors below which a stage triggers a batch retry.
    pub download_threshold: f64,
    pub upload_threshold: f64,
    pub create_threshold: f64,

    /// Batch-level retry budget and linear backoff base.
    pub max_batch_retries: u32,
    pub retry_base_delay: Duration,

    /// Wall-clock budget for one batch including all its retries.
    pub batch_budget: Duration,

    /// Per-task timeouts. The download stage performs a metadata request
    /// followed by the content fetch, so its pool timeout is the sum.
    pub download_meta_timeout: Duration,
    pub download_content_timeout: Duration,
    pub upload_timeout: Duration,
    pub create_timeout: Duration,

    /// Directory checkpoint files are created in and discovered from.
    pub checkpoint_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            download_workers: 20,
            upload_workers: 20,
            create_workers: 10,
            download_threshold: 0.80,
            upload_threshold: 0.80,
            create_threshold: 0.50,
            max_batch_retries: 3,
            retry_base_delay: Duration::from_secs(5),
            batch_budget: Duration::from_secs(30 * 60),
            download_meta_timeout: Duration::from_secs(60),
            download_content_timeout: Duration::from_secs(120),
            upload_timeout: Duration::from_secs(120),
            create_timeout: Duration::from_secs(60),
            checkpoint_dir: PathBuf::from("."),
        }
    }
}

impl RunConfig {
    /// Fails fast on values that would make the run misbehave, before
    /// any batch starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidBatchSize);
        }

        for (stage, limit) in [
            (Stage::Download, self.download_workers),
            (Stage::Upload, self.upload_workers),
            (Stage::Create, self.create_workers),
        ] {
            if limit == 0 {
                return Err(ConfigError::InvalidWorkerLimit { stage });
            }
        }

        for (stage, value) in [
            (Stage::Download, self.download_threshold),
            (Stage::Upload, self.upload_threshold),
            (Stage::Create, self.create_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::InvalidThreshold { stage, value });
            }
        }

        for (name, duration) in [
            ("batch_budget", self.batch_budget),
            ("download_meta_timeout", self.download_meta_timeout),
            ("download_content_timeout", self.download_content_timeout),
            ("upload_timeout", self.upload_timeout),
            ("create_timeout", self.create_timeout),
        ] {
            if duration.is_zero() {
                return Err(ConfigError::InvalidDuration { name });
            }
        }

        Ok(())
    }

    pub fn worker_limit(&self, stage: Stage) -> usize {
        match stage {
            Stage::Download => self.download_workers,
            Stage::Upload => self.upload_workers,
            Stage::Create => self.create_workers,
        }
    }

    pub fn task_timeout(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Download => self.download_meta_timeout + self.download_content_timeout,
            Stage::Upload => self.upload_timeout,
            Stage::Create => self.create_timeout,
        }
    }

    pub fn batch_retry_policy(&self) -> BatchRetryPolicy {
        BatchRetryPolicy {
            max_retries: self.max_batch_retries,
            base_delay: self.retry_base_delay,
            download_threshold: self.download_threshold,
            upload_threshold: self.upload_threshold,
            create_threshold: self.create_threshold,
        }
    }
}
