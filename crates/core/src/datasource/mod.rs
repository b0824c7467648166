use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use cdc_stage_common::{CdcStageError, Result};

use crate::formats::CdcEnvelope;

pub mod collector;
pub mod kafka;
pub mod memory;

pub use collector::{Batch, BatchCollector};
pub use memory::MemorySource;

/// A durable log of change events.
///
/// Delivery is at-least-once: anything returned by `poll` but not yet acknowledged through
/// `commit` may be delivered again to the next consumer of the same group.
#[async_trait]
pub trait EventSource: Send {
    /// Name used for logging and for naming staged artifacts, usually the topic.
    fn name(&self) -> &str;

    /// Returns at most `max` envelopes, waiting no longer than `timeout`. An empty result is
    /// not an error. Undecodable messages are dropped here and never reach the caller.
    async fn poll(&mut self, max: usize, timeout: Duration) -> Result<Vec<CdcEnvelope>>;

    /// Acknowledges everything returned by `poll` so far.
    async fn commit(&mut self) -> Result<()>;

    /// Forgets everything returned by `poll` since the last `commit`, so the next polls
    /// deliver it again.
    async fn rewind(&mut self) -> Result<()>;
}

/// When consumed offsets are acknowledged to the source log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    /// Only after the batch is staged. A crash in between redelivers the batch.
    #[default]
    AfterStage,
    /// As soon as messages are polled. A crash before staging loses them.
    OnPoll,
}

impl FromStr for CommitPolicy {
    type Err = CdcStageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "after_stage" => Ok(Self::AfterStage),
            "on_poll" => Ok(Self::OnPoll),
            _ => Err(CdcStageError::Config(format!(
                "Unrecognised CommitPolicy {}",
                s
            ))),
        }
    }
}
