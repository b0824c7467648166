use std::time::Duration;

use async_trait::async_trait;
use cdc_stage_common::{CdcStageError, Result};
use serde_json::Value;
use tracing::{debug, warn};

use super::{CommitPolicy, EventSource};
use crate::formats::decoders::{Decoder, JsonDecoder};
use crate::formats::CdcEnvelope;

/// An in-process log of raw message payloads.
///
/// Payloads go through the same decoder as Kafka messages. An empty log waits out the poll
/// timeout instead of returning immediately, like a consumer with nothing to fetch. The log
/// keeps every payload, so a rewind redelivers from the committed position.
#[derive(Debug, Default)]
pub struct MemorySource {
    name: String,
    log: Vec<Vec<u8>>,
    decoder: JsonDecoder,
    commit_policy: CommitPolicy,
    position: usize,
    committed: usize,
    dropped: usize,
    fail_next_poll: Option<String>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_commit_policy(mut self, commit_policy: CommitPolicy) -> Self {
        self.commit_policy = commit_policy;
        self
    }

    pub fn push(&mut self, payload: impl Into<Vec<u8>>) {
        self.log.push(payload.into());
    }

    pub fn push_json(&mut self, value: &Value) {
        self.push(value.to_string());
    }

    /// Makes the next poll fail as if the broker connection dropped.
    pub fn fail_next_poll(&mut self, reason: impl Into<String>) {
        self.fail_next_poll = Some(reason.into());
    }

    /// Messages not yet polled.
    pub fn remaining(&self) -> usize {
        self.log.len() - self.position
    }

    /// Position of the next message to poll. Dropped messages count as delivered.
    pub fn delivered(&self) -> usize {
        self.position
    }

    /// Position up to which delivery has been acknowledged.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Decode failures seen, counting redeliveries.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[async_trait]
impl EventSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn poll(&mut self, max: usize, timeout: Duration) -> Result<Vec<CdcEnvelope>> {
        if let Some(reason) = self.fail_next_poll.take() {
            return Err(CdcStageError::Kafka(reason));
        }
        if self.remaining() == 0 {
            tokio::time::sleep(timeout).await;
            return Ok(vec![]);
        }

        let mut envelopes = Vec::new();
        while envelopes.len() < max && self.position < self.log.len() {
            let offset = self.position;
            self.position += 1;
            match self.decoder.decode(&self.log[offset]) {
                Ok(Some(envelope)) => envelopes.push(envelope),
                Ok(None) => debug!("skipping tombstone at position {}", offset),
                Err(err) => {
                    warn!("skipping undecodable message at position {}: {}", offset, err);
                    self.dropped += 1;
                }
            }
        }

        if self.commit_policy == CommitPolicy::OnPoll {
            self.committed = self.position;
        }
        Ok(envelopes)
    }

    async fn commit(&mut self) -> Result<()> {
        self.committed = self.position;
        Ok(())
    }

    async fn rewind(&mut self) -> Result<()> {
        if self.position != self.committed {
            debug!(
                "rewinding {} from {} to {}",
                self.name, self.position, self.committed
            );
            self.position = self.committed;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_decodes_and_skips() {
        let mut source = MemorySource::new("products");
        source.push_json(&json!({"op": "c", "after": {"id": 1}}));
        source.push("");
        source.push("{invalid_json}");
        source.push_json(&json!({"schema": {}, "payload": {"op": "d", "before": {"id": 2}}}));

        let envelopes = source.poll(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(envelopes.len(), 2);
        assert_eq!(source.delivered(), 4);
        assert_eq!(source.dropped(), 1);
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test]
    async fn test_respects_max() {
        let mut source = MemorySource::new("products");
        for id in 0..4 {
            source.push_json(&json!({"op": "c", "after": {"id": id}}));
        }
        let envelopes = source.poll(3, Duration::from_millis(10)).await.unwrap();
        assert_eq!(envelopes.len(), 3);
        assert_eq!(source.remaining(), 1);
    }

    #[tokio::test]
    async fn test_commit_after_stage() {
        let mut source = MemorySource::new("products");
        source.push_json(&json!({"op": "c", "after": {"id": 1}}));
        source.poll(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(source.committed(), 0);
        source.commit().await.unwrap();
        assert_eq!(source.committed(), 1);
    }

    #[tokio::test]
    async fn test_commit_on_poll() {
        let mut source = MemorySource::new("products").with_commit_policy(CommitPolicy::OnPoll);
        source.push_json(&json!({"op": "c", "after": {"id": 1}}));
        source.poll(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(source.committed(), 1);
    }

    #[tokio::test]
    async fn test_rewind_redelivers_uncommitted() {
        let mut source = MemorySource::new("products");
        for id in 1..=3 {
            source.push_json(&json!({"op": "c", "after": {"id": id}}));
        }
        source.poll(1, Duration::from_millis(10)).await.unwrap();
        source.commit().await.unwrap();
        source.poll(10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(source.remaining(), 0);

        source.rewind().await.unwrap();
        assert_eq!(source.delivered(), 1);
        assert_eq!(source.remaining(), 2);
        let ids: Vec<_> = source
            .poll(10, Duration::from_millis(10))
            .await
            .unwrap()
            .iter()
            .map(|e| e.after.as_ref().unwrap()["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_rewind_is_noop_on_poll() {
        let mut source = MemorySource::new("products").with_commit_policy(CommitPolicy::OnPoll);
        source.push_json(&json!({"op": "c", "after": {"id": 1}}));
        source.poll(10, Duration::from_millis(10)).await.unwrap();
        source.rewind().await.unwrap();
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_poll_waits_for_timeout() {
        let mut source = MemorySource::new("products");
        let start = tokio::time::Instant::now();
        let envelopes = source.poll(10, Duration::from_secs(1)).await.unwrap();
        assert!(envelopes.is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
