use std::env;
use std::path::PathBuf;
use std::time::Duration;

use cdc_stage_common::{CdcStageError, Result};

use crate::datasource::BatchCollector;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings for one [`Pipeline`](crate::pipeline::Pipeline).
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub window: Duration,
    pub poll_timeout: Duration,
    pub staging_dir: PathBuf,
    /// Defaults to the source name, sanitized.
    pub artifact_prefix: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            window: DEFAULT_WINDOW,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            staging_dir: env::temp_dir(),
            artifact_prefix: None,
        }
    }
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn collector(&self) -> BatchCollector {
        BatchCollector::new(self.batch_size, self.window).with_poll_timeout(self.poll_timeout)
    }
}

#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    batch_size: Option<usize>,
    window: Option<Duration>,
    poll_timeout: Option<Duration>,
    staging_dir: Option<PathBuf>,
    artifact_prefix: Option<String>,
}

impl PipelineConfigBuilder {
    pub fn with_batch_size(&mut self, batch_size: usize) -> &mut Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_window(&mut self, window: Duration) -> &mut Self {
        self.window = Some(window);
        self
    }

    pub fn with_poll_timeout(&mut self, poll_timeout: Duration) -> &mut Self {
        self.poll_timeout = Some(poll_timeout);
        self
    }

    pub fn with_staging_dir(&mut self, staging_dir: impl Into<PathBuf>) -> &mut Self {
        self.staging_dir = Some(staging_dir.into());
        self
    }

    pub fn with_artifact_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.artifact_prefix = Some(prefix.into());
        self
    }

    pub fn build(&self) -> Result<PipelineConfig> {
        let default = PipelineConfig::default();
        let config = PipelineConfig {
            batch_size: self.batch_size.unwrap_or(default.batch_size),
            window: self.window.unwrap_or(default.window),
            poll_timeout: self.poll_timeout.unwrap_or(default.poll_timeout),
            staging_dir: self.staging_dir.clone().unwrap_or(default.staging_dir),
            artifact_prefix: self.artifact_prefix.clone(),
        };

        if config.batch_size == 0 {
            return Err(create_error("batch_size must be greater than zero"));
        }
        if config.window.is_zero() {
            return Err(create_error("window must be greater than zero"));
        }
        if config.poll_timeout.is_zero() || config.poll_timeout > config.window {
            return Err(create_error(
                "poll_timeout must be greater than zero and no longer than the window",
            ));
        }
        if matches!(&config.artifact_prefix, Some(prefix) if prefix.trim().is_empty()) {
            return Err(create_error("artifact_prefix must not be empty"));
        }
        Ok(config)
    }
}

fn create_error(msg: &str) -> CdcStageError {
    CdcStageError::Config(msg.to_string())
}
