use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use cdc_stage_common::{CdcStageError, Result};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::normalizer::NormalizedRecord;
use crate::utils::row_encoder::{records_to_batch, JsonLinesEncoder, RowEncoder};

pub const ARTIFACT_EXTENSION: &str = "jsonl";

/// Writes normalized records to line-delimited JSON files in a staging directory.
///
/// Records go to a hidden temporary file first. Only [`PendingArtifact::commit`] gives the
/// file its final name, so a failed or abandoned write never leaves a file that looks staged.
#[derive(Debug, Clone)]
pub struct StagingWriter {
    dir: PathBuf,
    prefix: String,
    encoder: JsonLinesEncoder,
}

impl StagingWriter {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            encoder: JsonLinesEncoder::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn artifact_path(&self, run_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{}.{}", self.prefix, run_id, ARTIFACT_EXTENSION))
    }

    /// Serializes and fsyncs `records` without publishing them.
    #[instrument(name = "StagingWriter::stage", skip(self, records), fields(records = records.len()))]
    pub fn stage(&self, run_id: &str, records: &[NormalizedRecord]) -> Result<PendingArtifact> {
        let batch = records_to_batch(records)?;

        let mut file = tempfile::Builder::new()
            .prefix(&format!(".{}-", self.prefix))
            .suffix(".partial")
            .tempfile_in(&self.dir)
            .map_err(|err| {
                CdcStageError::Staging(format!(
                    "cannot create artifact in {}: {}",
                    self.dir.display(),
                    err
                ))
            })?;

        let record_count = {
            let mut out = BufWriter::new(file.as_file_mut());
            let written = self.encoder.encode(&batch, &mut out)?;
            out.flush()?;
            written
        };
        file.as_file().sync_all()?;
        debug!("wrote {} records to {}", record_count, file.path().display());

        Ok(PendingArtifact {
            file,
            target: self.artifact_path(run_id),
            run_id: run_id.to_string(),
            record_count,
        })
    }

    /// Stages and commits in one step.
    pub fn write(&self, run_id: &str, records: &[NormalizedRecord]) -> Result<StagedArtifact> {
        self.stage(run_id, records)?.commit()
    }
}

/// Fully written records that are not yet visible under their final name.
/// Dropping it deletes the temporary file.
#[derive(Debug)]
pub struct PendingArtifact {
    file: NamedTempFile,
    target: PathBuf,
    run_id: String,
    record_count: usize,
}

impl PendingArtifact {
    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Atomically renames the file to its final name. Never replaces an existing artifact.
    pub fn commit(self) -> Result<StagedArtifact> {
        self.commit_with(sync_parent_dir)
    }

    fn commit_with(self, sync_dir: fn(&Path) -> Result<()>) -> Result<StagedArtifact> {
        let PendingArtifact {
            file,
            target,
            run_id,
            record_count,
        } = self;

        file.persist_noclobber(&target).map_err(|err| {
            CdcStageError::Staging(format!(
                "cannot commit artifact {}: {}",
                target.display(),
                err.error
            ))
        })?;
        if let Err(err) = sync_dir(&target) {
            // the rename is not durable; no artifact may exist under the final name
            if let Err(remove_err) = fs::remove_file(&target) {
                warn!("cannot remove {}: {}", target.display(), remove_err);
            }
            return Err(CdcStageError::Staging(format!(
                "cannot sync staging directory for {}: {}",
                target.display(),
                err
            )));
        }

        info!("Wrote {} clean rows to: {}", record_count, target.display());
        Ok(StagedArtifact {
            path: target,
            run_id,
            record_count,
        })
    }
}

/// A committed artifact. Ownership of the value is ownership of the file: whoever holds it is
/// responsible for loading it and then releasing it.
#[derive(Debug, PartialEq, Eq)]
pub struct StagedArtifact {
    path: PathBuf,
    run_id: String,
    record_count: usize,
}

impl StagedArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Deletes the file. Only call once the load has been confirmed.
    pub fn remove(self) -> Result<()> {
        fs::remove_file(&self.path)?;
        debug!("removed artifact {}", self.path.display());
        Ok(())
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::File::open(parent)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
