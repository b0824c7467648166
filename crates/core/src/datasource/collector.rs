use std::time::Duration;

use cdc_stage_common::Result;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, instrument, warn};

use super::EventSource;
use crate::formats::CdcEnvelope;

/// Envelopes gathered in one collection window, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    envelopes: Vec<CdcEnvelope>,
    elapsed: Duration,
}

impl Batch {
    pub fn new(envelopes: Vec<CdcEnvelope>) -> Self {
        Self {
            envelopes,
            elapsed: Duration::ZERO,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.envelopes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.envelopes.is_empty()
    }

    pub fn envelopes(&self) -> &[CdcEnvelope] {
        &self.envelopes
    }

    /// Time spent collecting the batch.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn into_envelopes(self) -> Vec<CdcEnvelope> {
        self.envelopes
    }
}

/// Pulls envelopes until `batch_size` is reached or `window` elapses, whichever comes first.
#[derive(Debug, Clone, Copy)]
pub struct BatchCollector {
    pub batch_size: usize,
    pub window: Duration,
    pub poll_timeout: Duration,
}

impl Default for BatchCollector {
    fn default() -> Self {
        Self {
            batch_size: 100,
            window: Duration::from_secs(30),
            poll_timeout: Duration::from_secs(1),
        }
    }
}

impl BatchCollector {
    pub fn new(batch_size: usize, window: Duration) -> Self {
        Self {
            batch_size,
            window,
            ..Default::default()
        }
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Each poll is bounded by the time left in the window, so a source that ignores its
    /// own timeout still cannot hold the collector past the window.
    #[instrument(name = "BatchCollector::collect", skip(self, source), fields(source = source.name()))]
    pub async fn collect<S>(&self, source: &mut S) -> Result<Batch>
    where
        S: EventSource + ?Sized,
    {
        let started = Instant::now();
        let deadline = started + self.window;
        let mut envelopes = Vec::with_capacity(self.batch_size.min(1024));
        let mut polls = 0usize;

        while envelopes.len() < self.batch_size {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let remaining = deadline - now;
            let wanted = self.batch_size - envelopes.len();
            polls += 1;

            match timeout(remaining, source.poll(wanted, self.poll_timeout.min(remaining))).await {
                Ok(polled) => {
                    let polled = polled?;
                    if polled.len() > wanted {
                        warn!(
                            "source returned {} envelopes when {} were requested",
                            polled.len(),
                            wanted
                        );
                    }
                    envelopes.extend(polled);
                }
                Err(_) => {
                    debug!("poll cut off by the end of the collection window");
                    break;
                }
            }
        }

        let elapsed = started.elapsed();
        if envelopes.is_empty() {
            info!("No messages consumed after {} polls", polls);
        } else {
            info!(
                "Consumed {} messages in {:?} ({} polls)",
                envelopes.len(),
                elapsed,
                polls
            );
        }
        Ok(Batch { envelopes, elapsed })
    }
}

/// Collects one batch with the default poll timeout.
pub async fn collect<S>(source: &mut S, batch_size: usize, window: Duration) -> Result<Batch>
where
    S: EventSource + ?Sized,
{
    BatchCollector::new(batch_size, window)
        .collect(source)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::MemorySource;
    use async_trait::async_trait;
    use cdc_stage_common::CdcStageError;
    use serde_json::json;

    fn source_with(count: i64) -> MemorySource {
        let mut source = MemorySource::new("inventory.products");
        for id in 0..count {
            source.push_json(&json!({"op": "c", "after": {"id": id}}));
        }
        source
    }

    /// Never answers within its timeout.
    struct StallingSource;

    #[async_trait]
    impl EventSource for StallingSource {
        fn name(&self) -> &str {
            "stalling"
        }

        async fn poll(&mut self, _max: usize, _timeout: Duration) -> Result<Vec<CdcEnvelope>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec![])
        }

        async fn commit(&mut self) -> Result<()> {
            Ok(())
        }

        async fn rewind(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_batch_size() {
        let mut source = source_with(5);
        let start = Instant::now();
        let batch = collect(&mut source, 3, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(source.remaining(), 2);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_partial_batch_when_window_closes() {
        let mut source = source_with(2);
        let start = Instant::now();
        let batch = collect(&mut source, 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
        let ids: Vec<_> = batch
            .envelopes()
            .iter()
            .map(|e| e.after.as_ref().unwrap()["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!(0), json!(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_source_yields_empty_batch() {
        let mut source = MemorySource::new("empty");
        let collector = BatchCollector::new(10, Duration::from_secs(5))
            .with_poll_timeout(Duration::from_millis(1500));
        let start = Instant::now();
        let batch = collector.collect(&mut source).await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert_eq!(batch.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_window() {
        let mut source = StallingSource;
        let start = Instant::now();
        let batch = collect(&mut source, 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_error_aborts_batch() {
        let mut source = source_with(2);
        source.fail_next_poll("broker unavailable");
        let err = collect(&mut source, 10, Duration::from_secs(30))
            .await
            .unwrap_err();
        assert!(matches!(err, CdcStageError::Kafka(msg) if msg == "broker unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_works_through_trait_object() {
        let mut source: Box<dyn EventSource> = Box::new(source_with(1));
        let batch = collect(source.as_mut(), 1, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
    }
}
