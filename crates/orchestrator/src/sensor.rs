use std::time::Duration;

use log::{debug, info};
use tokio::time::{sleep, Instant};

/// Poll-until-true readiness check, the way a scheduler decides whether a run has work.
#[derive(Debug, Clone, Copy)]
pub struct Sensor {
    pub poke_interval: Duration,
    pub timeout: Duration,
}

impl Default for Sensor {
    fn default() -> Self {
        Self {
            poke_interval: Duration::from_secs(30),
            timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorOutcome {
    Ready,
    /// The probe never succeeded. The run should be abandoned as a no-op.
    TimedOut,
}

impl Sensor {
    pub fn new(poke_interval: Duration, timeout: Duration) -> Self {
        Self {
            poke_interval,
            timeout,
        }
    }

    /// Pokes `probe` every `poke_interval` until it returns true or `timeout` elapses.
    /// The probe runs once more at the deadline.
    pub async fn wait_for<F>(&self, mut probe: F) -> SensorOutcome
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + self.timeout;
        let mut pokes = 0usize;
        loop {
            pokes += 1;
            if probe() {
                debug!("sensor ready after {} pokes", pokes);
                return SensorOutcome::Ready;
            }
            let now = Instant::now();
            if now >= deadline {
                info!("sensor timed out after {} pokes", pokes);
                return SensorOutcome::TimedOut;
            }
            sleep(self.poke_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_poke() {
        let sensor = Sensor::default();
        let start = Instant::now();
        assert_eq!(sensor.wait_for(|| true).await, SensorOutcome::Ready);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn ready_after_some_pokes() {
        let sensor = Sensor::new(Duration::from_secs(30), Duration::from_secs(600));
        let mut pokes = 0;
        let outcome = sensor
            .wait_for(|| {
                pokes += 1;
                pokes == 3
            })
            .await;
        assert_eq!(outcome, SensorOutcome::Ready);
        assert_eq!(pokes, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_without_overshooting() {
        let sensor = Sensor::new(Duration::from_secs(30), Duration::from_secs(100));
        let start = Instant::now();
        let mut pokes = 0;
        let outcome = sensor
            .wait_for(|| {
                pokes += 1;
                false
            })
            .await;
        assert_eq!(outcome, SensorOutcome::TimedOut);
        assert_eq!(start.elapsed(), Duration::from_secs(100));
        // t = 0, 30, 60, 90, 100
        assert_eq!(pokes, 5);
    }
}
