use std::collections::{BTreeMap, VecDeque};

use rdkafka::error::KafkaResult;
use rdkafka::{Offset, TopicPartitionList};

use crate::datasource::CommitPolicy;
use crate::formats::CdcEnvelope;

/// A message read from the consumer but not yet returned by `poll`.
#[derive(Debug, Clone)]
pub struct Polled {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// `None` for tombstones and undecodable payloads.
    pub envelope: Option<CdcEnvelope>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PartitionRange {
    first: i64,
    next: i64,
}

/// Offsets handed to the caller since the last commit, per (topic, partition).
///
/// Under [`CommitPolicy::OnPoll`] the consumer acknowledges on its own and nothing is tracked.
#[derive(Debug, Clone)]
pub struct OffsetTracker {
    policy: CommitPolicy,
    ranges: BTreeMap<(String, i32), PartitionRange>,
}

impl OffsetTracker {
    pub fn new(policy: CommitPolicy) -> Self {
        Self {
            policy,
            ranges: BTreeMap::new(),
        }
    }

    pub fn policy(&self) -> CommitPolicy {
        self.policy
    }

    pub fn record(&mut self, topic: &str, partition: i32, offset: i64) {
        if self.policy == CommitPolicy::OnPoll {
            return;
        }
        self.ranges
            .entry((topic.to_string(), partition))
            .and_modify(|range| {
                range.first = range.first.min(offset);
                range.next = range.next.max(offset + 1);
            })
            .or_insert(PartitionRange {
                first: offset,
                next: offset + 1,
            });
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Offset to commit for each partition: one past the last message returned.
    pub fn next_offsets(&self) -> Vec<(String, i32, i64)> {
        self.ranges
            .iter()
            .map(|((topic, partition), range)| (topic.clone(), *partition, range.next))
            .collect()
    }

    /// Offset to seek back to for each partition: the first message not yet acknowledged.
    pub fn first_offsets(&self) -> Vec<(String, i32, i64)> {
        self.ranges
            .iter()
            .map(|((topic, partition), range)| (topic.clone(), *partition, range.first))
            .collect()
    }

    pub fn commit_list(&self) -> KafkaResult<TopicPartitionList> {
        let mut offsets = TopicPartitionList::new();
        for (topic, partition, offset) in self.next_offsets() {
            offsets.add_partition_offset(&topic, partition, Offset::Offset(offset))?;
        }
        Ok(offsets)
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}

/// Returns up to `max` envelopes from the front of `buffered`, recording the offset of every
/// message taken, envelope or not. Whatever is left stays buffered for the next call.
pub fn drain_polled(
    buffered: &mut VecDeque<Polled>,
    offsets: &mut OffsetTracker,
    max: usize,
) -> Vec<CdcEnvelope> {
    let mut envelopes = Vec::new();
    while envelopes.len() < max {
        let Some(polled) = buffered.pop_front() else {
            break;
        };
        offsets.record(&polled.topic, polled.partition, polled.offset);
        envelopes.extend(polled.envelope);
    }
    envelopes
}
