//! Human-like pauses: delay ranges and the injectable delay provider.

use async_trait::async_trait;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Inclusive range of milliseconds a jittered pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    /// Creates a range; bounds given in the wrong order are swapped.
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        if min_ms <= max_ms {
            Self { min_ms, max_ms }
        } else {
            Self { min_ms: max_ms, max_ms: min_ms }
        }
    }

    /// A range that always yields zero.
    pub fn zero() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    /// Draws a uniformly distributed duration from the range.
    pub fn sample(&self) -> Duration {
        let ms = if self.max_ms > self.min_ms {
            rand::rng().random_range(self.min_ms..=self.max_ms)
        } else {
            self.min_ms
        };
        Duration::from_millis(ms)
    }
}

impl std::fmt::Display for DelayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}ms", self.min_ms, self.max_ms)
    }
}

/// Source of all wall-clock pauses taken by the navigator and the batch runner.
#[async_trait]
pub trait DelayProvider: Send + Sync {
    async fn sleep(&self, duration: Duration);

    /// Sleeps for a duration drawn from `range`.
    async fn jitter(&self, range: DelayRange) {
        self.sleep(range.sample()).await;
    }
}

/// Production provider backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct JitterDelay;

#[async_trait]
impl DelayProvider for JitterDelay {
    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        trace!("Delaying {}ms", duration.as_millis());
        tokio::time::sleep(duration).await;
    }
}

/// Provider that never waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

#[async_trait]
impl DelayProvider for NoDelay {
    async fn sleep(&self, _duration: Duration) {}

    async fn jitter(&self, _range: DelayRange) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_sample_within_bounds() {
        let range = DelayRange::new(500, 1500);
        for _ in 0..200 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(500));
            assert!(d <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn test_degenerate_range() {
        assert_eq!(DelayRange::new(700, 700).sample(), Duration::from_millis(700));
        assert_eq!(DelayRange::zero().sample(), Duration::ZERO);
    }

    #[test]
    fn test_swapped_bounds() {
        let range = DelayRange::new(5000, 2000);
        assert_eq!(range.min_ms, 2000);
        assert_eq!(range.max_ms, 5000);
    }

    #[test]
    fn test_display() {
        assert_eq!(DelayRange::new(2000, 5000).to_string(), "2000-5000ms");
    }

    #[test]
    fn test_serde() {
        let range: DelayRange = toml::from_str("min_ms = 100\nmax_ms = 200").unwrap();
        assert_eq!(range, DelayRange::new(100, 200));
    }

    #[tokio::test]
    async fn test_no_delay_returns_immediately() {
        let started = Instant::now();
        NoDelay.jitter(DelayRange::new(10_000, 20_000)).await;
        NoDelay.sleep(Duration::from_secs(30)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_jitter_delay_sleeps() {
        let started = Instant::now();
        JitterDelay.jitter(DelayRange::new(20, 30)).await;
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
