use chrono::{DateTime, Utc};
use std::time::Duration;

/// Source of timestamps and simulated latency.
///
/// Every delay in the crate goes through this so tests can run with paused
/// tokio time or without any delay at all.
pub trait Clock: Send + Sync + Clone + 'static {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Simulated latency of each lifecycle operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LatencyProfile {
    pub create: Duration,
    pub start: Duration,
    pub stop: Duration,
    pub remove: Duration,
    pub update: Duration,
}

impl Default for LatencyProfile {
    fn default() -> Self {
        Self {
            create: Duration::from_millis(1000),
            start: Duration::from_millis(2000),
            stop: Duration::from_millis(1500),
            remove: Duration::from_millis(1000),
            update: Duration::from_millis(1000),
        }
    }
}

impl LatencyProfile {
    pub fn instant() -> Self {
        Self {
            create: Duration::ZERO,
            start: Duration::ZERO,
            stop: Duration::ZERO,
            remove: Duration::ZERO,
            update: Duration::ZERO,
        }
    }
}
