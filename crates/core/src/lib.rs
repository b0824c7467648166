pub mod config;
pub mod datasource;
pub mod formats;
pub mod loader;
pub mod normalizer;
pub mod pipeline;
pub mod staging;
pub mod utils;

pub mod prelude {
    pub use crate::config::PipelineConfig;
    pub use crate::datasource::kafka::{KafkaSource, KafkaSourceBuilder};
    pub use crate::datasource::{CommitPolicy, EventSource, MemorySource};
    pub use crate::formats::{CdcEnvelope, Operation};
    pub use crate::loader::LoadRequest;
    pub use crate::normalizer::{NormalizeReport, NormalizedRecord};
    pub use crate::pipeline::{Pipeline, RunOutcome};
    pub use crate::staging::{StagedArtifact, StagingWriter};

    pub use cdc_stage_common::{CdcStageError, Result};
    pub use cdc_stage_orchestrator::{
        create_channel, OrchestrationMessage, PipelineState, Sensor, SensorOutcome, StateHandle,
    };
}
