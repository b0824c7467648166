use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdc_stage_common::{CdcStageError, Result};
use futures::StreamExt;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::{Message, Offset};
use tracing::{debug, error, info, instrument, warn};

use super::offsets::{drain_polled, OffsetTracker, Polled};
use super::KafkaReadConfig;
use crate::datasource::{CommitPolicy, EventSource};
use crate::formats::decoders::{Decoder, JsonDecoder};
use crate::formats::CdcEnvelope;

const SEEK_TIMEOUT: Duration = Duration::from_secs(10);

/// Consumes Debezium envelopes from a Kafka topic.
///
/// Messages are buffered as they arrive and only count as delivered once `poll` returns them,
/// so a poll dropped halfway through loses nothing.
pub struct KafkaSource {
    config: Arc<KafkaReadConfig>,
    consumer: StreamConsumer,
    decoder: JsonDecoder,
    buffered: VecDeque<Polled>,
    offsets: OffsetTracker,
}

impl KafkaSource {
    pub fn new(config: Arc<KafkaReadConfig>, consumer: StreamConsumer) -> Self {
        let offsets = OffsetTracker::new(config.commit_policy);
        Self {
            config,
            consumer,
            decoder: JsonDecoder::new(),
            buffered: VecDeque::new(),
            offsets,
        }
    }
}

#[async_trait]
impl EventSource for KafkaSource {
    fn name(&self) -> &str {
        &self.config.topic
    }

    #[instrument(name = "KafkaSource::poll", skip(self), fields(topic = %self.config.topic))]
    async fn poll(&mut self, max: usize, timeout: Duration) -> Result<Vec<CdcEnvelope>> {
        let wanted = max.saturating_sub(self.buffered.len());
        if wanted > 0 {
            let mut stream = self
                .consumer
                .stream()
                .take_until(Box::pin(tokio::time::sleep(timeout)))
                .take(wanted);

            while let Some(message) = stream.next().await {
                let m = message.map_err(|err| {
                    error!("Error reading from Kafka {:?}", err);
                    kafka_error(err)
                })?;

                let envelope = match m.payload() {
                    None => {
                        debug!(
                            partition = m.partition(),
                            offset = m.offset(),
                            "skipping tombstone"
                        );
                        None
                    }
                    Some(payload) => match self.decoder.decode(payload) {
                        Ok(envelope) => envelope,
                        Err(err) => {
                            warn!(
                                partition = m.partition(),
                                offset = m.offset(),
                                "skipping undecodable message: {}",
                                err
                            );
                            None
                        }
                    },
                };
                self.buffered.push_back(Polled {
                    topic: m.topic().to_string(),
                    partition: m.partition(),
                    offset: m.offset(),
                    envelope,
                });
            }
        }

        let envelopes = drain_polled(&mut self.buffered, &mut self.offsets, max);
        debug!("Batch size {}", envelopes.len());
        Ok(envelopes)
    }

    async fn commit(&mut self) -> Result<()> {
        if self.offsets.is_empty() {
            return Ok(());
        }

        let offsets = self.offsets.commit_list().map_err(kafka_error)?;
        self.consumer
            .commit(&offsets, CommitMode::Sync)
            .map_err(kafka_error)?;

        info!(
            "Committed offsets for {} partitions of {}",
            self.offsets.len(),
            self.config.topic
        );
        self.offsets.clear();
        Ok(())
    }

    async fn rewind(&mut self) -> Result<()> {
        if self.offsets.policy() == CommitPolicy::OnPoll {
            return Ok(());
        }

        let mut consumed = self.offsets.clone();
        for polled in self.buffered.drain(..) {
            consumed.record(&polled.topic, polled.partition, polled.offset);
        }
        for (topic, partition, offset) in consumed.first_offsets() {
            self.consumer
                .seek(&topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
                .map_err(kafka_error)?;
            debug!("rewound {}[{}] to offset {}", topic, partition, offset);
        }

        if !consumed.is_empty() {
            info!(
                "Rewound {} partitions of {} to the last committed position",
                consumed.len(),
                self.config.topic
            );
        }
        self.offsets.clear();
        Ok(())
    }
}

fn kafka_error(err: KafkaError) -> CdcStageError {
    CdcStageError::Kafka(err.to_string())
}
