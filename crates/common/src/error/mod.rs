use std::result;
use thiserror::Error;

use arrow_schema::ArrowError;

/// Result type for operations that could result in a [CdcStageError]
pub type Result<T, E = CdcStageError> = result::Result<T, E>;

/// Batch-level failures. Anything that reaches this type aborts the current batch.
#[derive(Error, Debug)]
pub enum CdcStageError {
    #[error("Kafka error: {0}")]
    Kafka(String),
    #[error("Kafka config error: {0}")]
    KafkaConfig(String),
    #[error("Pipeline config error: {0}")]
    Config(String),
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("Arrow Error")]
    Arrow(#[from] ArrowError),
    #[error("Staging error: {0}")]
    Staging(String),
    #[error("invalid pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CdcStageError {
    /// Source log failures are fatal for the batch but worth retrying on the next run.
    pub fn is_source_error(&self) -> bool {
        matches!(self, CdcStageError::Kafka(_))
    }
}
