use std::mem;

use cdc_stage_common::{CdcStageError, Result};
use cdc_stage_orchestrator::{
    HandoffSender, OrchestrationMessage, Orchestrator, PipelineState, StateHandle,
};
use tracing::{error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::datasource::{Batch, BatchCollector, EventSource};
use crate::normalizer::{normalize_batch, NormalizeReport, NormalizedRecord};
use crate::staging::{PendingArtifact, StagedArtifact, StagingWriter};
use crate::utils::{generate_run_id, sanitize_prefix};

#[derive(Debug)]
pub enum RunOutcome {
    /// The collection window closed without any envelope. Nothing was staged.
    NoWork { run_id: String },
    Staged {
        artifact: StagedArtifact,
        report: NormalizeReport,
    },
}

/// Collects one batch at a time from `source`, normalizes it and stages it for loading.
///
/// The stages can be driven one by one (`collect`, `normalize`, `stage`, `handoff`) by an
/// external scheduler, or all at once with [`Pipeline::run`]. The pipeline holds the batch and
/// the artifact between stages itself.
pub struct Pipeline<S> {
    source: S,
    collector: BatchCollector,
    writer: StagingWriter,
    orchestrator: Orchestrator,
    handoff: Option<HandoffSender>,
    run_id: String,
    batch: Option<Batch>,
    records: Vec<NormalizedRecord>,
    report: NormalizeReport,
    artifact: Option<StagedArtifact>,
}

impl<S: EventSource> Pipeline<S> {
    pub fn new(source: S, config: PipelineConfig) -> Self {
        let prefix = config
            .artifact_prefix
            .clone()
            .unwrap_or_else(|| sanitize_prefix(source.name()));
        Self {
            collector: config.collector(),
            writer: StagingWriter::new(config.staging_dir, prefix),
            source,
            orchestrator: Orchestrator::new(),
            handoff: None,
            run_id: String::new(),
            batch: None,
            records: Vec::new(),
            report: NormalizeReport::default(),
            artifact: None,
        }
    }

    /// Publishes run results on `sender` in addition to returning them.
    pub fn with_handoff(mut self, sender: HandoffSender) -> Self {
        self.handoff = Some(sender);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.orchestrator.state()
    }

    pub fn state_handle(&self) -> StateHandle {
        self.orchestrator.handle()
    }

    /// Readiness probe: a non-empty batch is waiting to be normalized.
    pub fn is_ready(&self) -> bool {
        self.orchestrator.handle().is_ready()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn report(&self) -> &NormalizeReport {
        &self.report
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn writer(&self) -> &StagingWriter {
        &self.writer
    }

    /// Starts a new run and collects a batch. Returns the number of envelopes collected;
    /// zero ends the run in `Empty`.
    #[instrument(name = "Pipeline::collect", skip(self), fields(source = self.source.name()))]
    pub async fn collect(&mut self) -> Result<usize> {
        let interrupted = self.state() == PipelineState::Collecting;
        self.orchestrator.reset()?;
        if self.batch.take().is_some() {
            warn!("discarding a collected batch that was never normalized");
        }
        if interrupted {
            self.source.rewind().await?;
        }
        self.run_id = generate_run_id();
        self.records.clear();
        self.report = NormalizeReport::default();
        self.orchestrator.transition(PipelineState::Collecting)?;

        match self.collector.collect(&mut self.source).await {
            Ok(batch) if batch.is_empty() => {
                self.orchestrator.transition(PipelineState::Empty)?;
                info!(run_id = %self.run_id, "no work for this run");
                self.publish(OrchestrationMessage::NoWork {
                    run_id: self.run_id.clone(),
                });
                Ok(0)
            }
            Ok(batch) => {
                let collected = batch.len();
                self.orchestrator.set_pending_events(collected);
                self.batch = Some(batch);
                Ok(collected)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    pub fn normalize(&mut self) -> Result<NormalizeReport> {
        let Some(batch) = self.batch.take() else {
            return Err(invalid_transition(self.state(), PipelineState::Normalizing));
        };
        if let Err(err) = self.orchestrator.transition(PipelineState::Normalizing) {
            self.batch = Some(batch);
            return Err(err);
        }

        let (records, report) = normalize_batch(batch.envelopes());
        info!(
            run_id = %self.run_id,
            envelopes = report.envelopes,
            records = report.records,
            noise = report.noise,
            diagnostics = report.diagnostics,
            price_decode_failures = report.price_decode_failures,
            "normalized batch"
        );
        self.records = records;
        self.report = report;
        Ok(report)
    }

    /// Writes the normalized records and, once the artifact is committed, acknowledges the
    /// batch to the source.
    #[instrument(name = "Pipeline::stage", skip(self), fields(run_id = %self.run_id))]
    pub async fn stage(&mut self) -> Result<&StagedArtifact> {
        self.orchestrator.transition(PipelineState::Staging)?;

        let records = mem::take(&mut self.records);
        let writer = self.writer.clone();
        let run_id = self.run_id.clone();
        let staged = match tokio::task::spawn_blocking(move || writer.stage(&run_id, &records))
            .await
        {
            Ok(pending) => pending.and_then(PendingArtifact::commit),
            Err(err) => Err(CdcStageError::Staging(format!(
                "staging task failed: {err}"
            ))),
        };
        let artifact = match staged {
            Ok(artifact) => artifact,
            Err(err) => return Err(self.fail(err).await),
        };
        self.orchestrator.transition(PipelineState::Ready)?;

        if let Err(err) = self.source.commit().await {
            warn!(
                "staged {} but could not commit source offsets, the batch may be redelivered: {}",
                artifact.path().display(),
                err
            );
        }
        Ok(&*self.artifact.insert(artifact))
    }

    /// Transfers the staged artifact to the caller, who passes it on to the loader.
    pub fn handoff(&mut self) -> Result<StagedArtifact> {
        let state = self.state();
        let artifact = match self.artifact.take() {
            Some(artifact) if state == PipelineState::Ready => artifact,
            other => {
                self.artifact = other;
                return Err(invalid_transition(state, PipelineState::HandedOff));
            }
        };
        if let Err(err) = self.orchestrator.transition(PipelineState::HandedOff) {
            self.artifact = Some(artifact);
            return Err(err);
        }

        self.publish(OrchestrationMessage::ArtifactStaged {
            run_id: artifact.run_id().to_string(),
            locator: artifact.path().to_path_buf(),
            record_count: artifact.record_count(),
        });
        Ok(artifact)
    }

    /// Deletes an artifact after the loader reported a successful load.
    pub fn confirm_loaded(&self, artifact: StagedArtifact) -> Result<()> {
        info!(
            run_id = artifact.run_id(),
            "load confirmed, removing {}",
            artifact.path().display()
        );
        artifact.remove()
    }

    /// Gives up on the current run without failing it, e.g. when a readiness check timed out.
    /// Nothing is acknowledged; the source is rewound so the next run sees the same events.
    pub async fn abandon(&mut self) -> Result<()> {
        self.orchestrator.abandon()?;
        if self.batch.take().is_some() {
            info!(run_id = %self.run_id, "abandoned collected batch");
        }
        self.records.clear();
        self.source.rewind().await
    }

    /// Runs every stage and hands the artifact off to the caller.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        if self.collect().await? == 0 {
            return Ok(RunOutcome::NoWork {
                run_id: self.run_id.clone(),
            });
        }
        let report = self.normalize()?;
        self.stage().await?;
        let artifact = self.handoff()?;
        Ok(RunOutcome::Staged { artifact, report })
    }

    async fn fail(&mut self, err: CdcStageError) -> CdcStageError {
        error!(run_id = %self.run_id, "pipeline run failed: {}", err);
        if let Err(transition_err) = self.orchestrator.transition(PipelineState::Failed) {
            warn!("{}", transition_err);
        }
        if let Err(rewind_err) = self.source.rewind().await {
            warn!("could not rewind {}: {}", self.source.name(), rewind_err);
        }
        self.publish(OrchestrationMessage::RunFailed {
            run_id: self.run_id.clone(),
            reason: err.to_string(),
        });
        err
    }

    fn publish(&self, msg: OrchestrationMessage) {
        if let Some(handoff) = &self.handoff {
            handoff.publish(msg);
        }
    }
}

fn invalid_transition(from: PipelineState, to: PipelineState) -> CdcStageError {
    CdcStageError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}
