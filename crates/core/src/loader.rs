//! Describes the warehouse load that consumes a staged artifact.
//!
//! Nothing here talks to a warehouse. A [`LoadRequest`] only carries what the external load
//! step needs and renders the equivalent `bq load` invocation.

use std::path::{Path, PathBuf};

use crate::staging::StagedArtifact;

/// Destination schema. `price` is NUMERIC on the warehouse side even though the artifact
/// carries a float.
pub const TABLE_SCHEMA: &str = "id:INTEGER,name:STRING,description:STRING,price:NUMERIC";
pub const SOURCE_FORMAT: &str = "NEWLINE_DELIMITED_JSON";

/// An append-only load of one artifact into one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    project_id: Option<String>,
    destination: String,
    locator: PathBuf,
    record_count: usize,
}

impl LoadRequest {
    pub fn new(destination: impl Into<String>, artifact: &StagedArtifact) -> Self {
        Self {
            project_id: None,
            destination: destination.into(),
            locator: artifact.path().to_path_buf(),
            record_count: artifact.record_count(),
        }
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn locator(&self) -> &Path {
        &self.locator
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Arguments for `bq`. Loads always append.
    pub fn bq_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(7);
        if let Some(project_id) = &self.project_id {
            args.push(format!("--project_id={project_id}"));
        }
        args.push("load".to_string());
        args.push(format!("--source_format={SOURCE_FORMAT}"));
        args.push("--replace=false".to_string());
        args.push(format!("--schema={TABLE_SCHEMA}"));
        args.push(self.destination.clone());
        args.push(self.locator.display().to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::NormalizedRecord;
    use crate::staging::StagingWriter;

    #[test]
    fn test_bq_args() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = StagingWriter::new(dir.path(), "products")
            .write(
                "run-1",
                &[NormalizedRecord {
                    id: 1,
                    name: None,
                    description: None,
                    price: None,
                }],
            )
            .unwrap();

        let request = LoadRequest::new("data_warehouse.products_cdc", &artifact)
            .with_project("cdc-project");
        assert_eq!(request.record_count(), 1);
        assert_eq!(request.locator(), artifact.path());
        assert_eq!(
            request.bq_args(),
            vec![
                "--project_id=cdc-project".to_string(),
                "load".to_string(),
                "--source_format=NEWLINE_DELIMITED_JSON".to_string(),
                "--replace=false".to_string(),
                "--schema=id:INTEGER,name:STRING,description:STRING,price:NUMERIC".to_string(),
                "data_warehouse.products_cdc".to_string(),
                artifact.path().display().to_string(),
            ]
        );
    }
}
