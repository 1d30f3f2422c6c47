//! Retry timing for polling loops
//!
//! Polling is parameterized by a [`RetryPolicy`] (interval, growth, cap, jitter) and a
//! [`Clock`]. Production code uses [`TokioClock`]; tests use [`ManualClock`], whose
//! `sleep` advances virtual time instantly so deadline behaviour can be exercised
//! without real waiting.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Source of time for deadline checks and sleeps
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);

    /// Time left until `deadline`, zero once it has passed
    fn remaining(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.now())
    }
}

/// Clock backed by the tokio timer.
///
/// Honors `tokio::time::pause`, so tests running with `start_paused = true` auto-advance.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock that only moves when slept on or advanced.
///
/// Not suitable for racing two sleepers against each other: each `sleep` jumps
/// the shared time forward immediately.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset += by;
        }
    }

    /// Virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.offset.lock().map(|o| *o).unwrap_or_default()
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(duration);
        }
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

/// Poll timing: first interval, growth factor, cap and jitter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    pub interval: Duration,
    /// Upper bound for any single delay
    pub max_interval: Duration,
    /// Growth factor applied after every attempt (1.0 = fixed interval)
    pub multiplier: f64,
    /// Relative jitter in `[0, 1)`; 0.25 spreads delays over 0.75x..1.25x
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(30),
            multiplier: 1.5,
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval polling
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            policy: self.clone(),
            current: self.interval,
        }
    }
}

/// Delay sequence produced by a [`RetryPolicy`]
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    current: Duration,
}

impl Backoff {
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current.min(self.policy.max_interval);

        let grown = base.as_secs_f64() * self.policy.multiplier.max(1.0);
        self.current = Duration::from_secs_f64(grown.min(self.policy.max_interval.as_secs_f64()));

        let jitter = self.policy.jitter.clamp(0.0, 0.99);
        if jitter == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..(1.0 + jitter));
        Duration::from_secs_f64(base.as_secs_f64() * factor)
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_delay())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── backoff ────────────────────────────────────────────────────────────

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            interval: Duration::from_secs(2),
            max_interval: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.0,
        };
        let delays: Vec<u64> = policy.backoff().take(5).map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_fixed_policy() {
        let policy = RetryPolicy::fixed(Duration::from_millis(250));
        assert!(policy
            .backoff()
            .take(4)
            .all(|d| d == Duration::from_millis(250)));
    }

    #[test]
    fn test_multiplier_below_one_does_not_shrink() {
        let policy = RetryPolicy {
            interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(30),
            multiplier: 0.5,
            jitter: 0.0,
        };
        assert!(policy.backoff().take(3).all(|d| d == Duration::from_secs(3)));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let policy = RetryPolicy {
            interval: Duration::from_secs(4),
            max_interval: Duration::from_secs(4),
            multiplier: 1.0,
            jitter: 0.25,
        };
        for delay in policy.backoff().take(50) {
            assert!(delay >= Duration::from_secs(3) && delay <= Duration::from_secs(5));
        }
    }

    // ── clocks ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_without_waiting() {
        let clock = ManualClock::new();
        let start = clock.now();
        clock.sleep(Duration::from_secs(3600)).await;
        assert_eq!(clock.now() - start, Duration::from_secs(3600));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3600)]);
    }

    #[tokio::test]
    async fn test_remaining_saturates() {
        let clock = ManualClock::new();
        let deadline = clock.now() + Duration::from_secs(5);
        assert_eq!(clock.remaining(deadline), Duration::from_secs(5));
        clock.advance(Duration::from_secs(7));
        assert_eq!(clock.remaining(deadline), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock;
        let start = clock.now();
        clock.sleep(Duration::from_secs(90)).await;
        assert!(clock.now() - start >= Duration::from_secs(90));
    }
}
