pub mod writer;

pub use writer::{PendingArtifact, StagedArtifact, StagingWriter, ARTIFACT_EXTENSION};
