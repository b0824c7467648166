use std::{fmt, path::PathBuf, sync::Arc};

use cdc_stage_common::{CdcStageError, Result};
use log::{debug, warn};
use parking_lot::RwLock;

/// Messages published to the external load step over a handoff channel.
#[derive(Clone, Debug, PartialEq)]
pub enum OrchestrationMessage {
    ArtifactStaged {
        run_id: String,
        locator: PathBuf,
        record_count: usize,
    },
    NoWork {
        run_id: String,
    },
    RunFailed {
        run_id: String,
        reason: String,
    },
}

impl OrchestrationMessage {
    pub fn run_id(&self) -> &str {
        match self {
            OrchestrationMessage::ArtifactStaged { run_id, .. }
            | OrchestrationMessage::NoWork { run_id }
            | OrchestrationMessage::RunFailed { run_id, .. } => run_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    /// Polling the source. A non-empty batch stays here until normalization starts.
    Collecting,
    /// The window closed without a single envelope. Nothing is staged.
    Empty,
    Normalizing,
    Staging,
    /// An artifact is committed and waiting for the loader.
    Ready,
    HandedOff,
    Failed,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Collecting)
                | (Collecting, Idle)
                | (Collecting, Empty)
                | (Collecting, Normalizing)
                | (Collecting, Failed)
                | (Normalizing, Staging)
                | (Staging, Ready)
                | (Staging, Failed)
                | (Ready, HandedOff)
                | (HandedOff, Idle)
                | (Empty, Idle)
                | (Failed, Idle)
        )
    }

    /// States that end a run. The orchestrator must be reset before collecting again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Empty | PipelineState::HandedOff | PipelineState::Failed
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Default)]
struct Status {
    state: PipelineState,
    pending_events: usize,
}

/// Tracks the state of a single pipeline instance.
///
/// The status lives behind a lock so that a scheduler holding a [`StateHandle`] can probe
/// readiness from another task while the pipeline itself owns the `Orchestrator`.
#[derive(Debug, Default)]
pub struct Orchestrator {
    status: Arc<RwLock<Status>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipelineState {
        self.status.read().state
    }

    pub fn transition(&self, next: PipelineState) -> Result<()> {
        let mut status = self.status.write();
        let current = status.state;
        if !current.can_transition_to(next) {
            warn!("rejected pipeline transition {} -> {}", current, next);
            return Err(CdcStageError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }
        debug!("pipeline transition {} -> {}", current, next);
        status.state = next;
        if matches!(next, PipelineState::Idle | PipelineState::Empty) {
            status.pending_events = 0;
        }
        Ok(())
    }

    /// Moves a finished run back to `Idle`. A no-op when already idle.
    pub fn reset(&self) -> Result<()> {
        match self.state() {
            PipelineState::Idle => Ok(()),
            _ => self.transition(PipelineState::Idle),
        }
    }

    /// Gives up on the current run. A collected batch is discarded; an interrupted stage is
    /// marked failed. A staged artifact waiting for handoff is never abandoned.
    pub fn abandon(&self) -> Result<()> {
        match self.state() {
            PipelineState::Staging => {
                self.transition(PipelineState::Failed)?;
                self.transition(PipelineState::Idle)
            }
            _ => self.reset(),
        }
    }

    pub fn set_pending_events(&self, count: usize) {
        self.status.write().pending_events = count;
    }

    pub fn handle(&self) -> StateHandle {
        StateHandle {
            status: self.status.clone(),
        }
    }
}

/// Read-only view on an [`Orchestrator`], cheap to clone and share with a scheduler.
#[derive(Debug, Clone)]
pub struct StateHandle {
    status: Arc<RwLock<Status>>,
}

impl StateHandle {
    pub fn state(&self) -> PipelineState {
        self.status.read().state
    }

    pub fn pending_events(&self) -> usize {
        self.status.read().pending_events
    }

    /// Readiness probe: a non-empty batch has been collected and awaits normalization.
    pub fn is_ready(&self) -> bool {
        let status = self.status.read();
        status.state == PipelineState::Collecting && status.pending_events > 0
    }
}
