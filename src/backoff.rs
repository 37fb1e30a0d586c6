//! Pacing and retry policies.
//!
//! Every wait in the pipeline goes through a [`Clock`], so scoring and
//! rotation can be driven by a [`VirtualClock`] in tests without sleeping.
//!
//! # Backoff Strategy
//!
//! [`RetryPolicy::delay_for`] follows:
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(jitter.min..=jitter.max)
//! ```

use chrono::{Local, NaiveDate};
use rand::{Rng, rng};
use std::time::Duration;

/// Source of time for sleeps and "today".
pub trait Clock {
    /// Wait for `duration`. Nothing else runs meanwhile.
    async fn sleep(&self, duration: Duration);

    /// The current local calendar date.
    fn today(&self) -> NaiveDate;
}

/// Wall-clock implementation backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }

    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Inclusive range a random delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    /// Build a range; swapped bounds are reordered.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    pub fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    pub fn zero() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Draw a delay uniformly from the range, at millisecond resolution.
    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        Duration::from_millis(rng().random_range(lo..=hi))
    }
}

/// Bounded retry with capped exponential backoff and jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_attempts: usize,
    /// Delay after the first failed attempt (doubles with each attempt).
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
    /// Random extra delay added on top.
    pub jitter: DelayRange,
}

impl RetryPolicy {
    /// A policy whose delay does not grow between attempts.
    pub fn constant(max_attempts: usize, delay: Duration, jitter: DelayRange) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            jitter,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let mut delay = self.base_delay.saturating_mul(1u32 << shift);
        if delay > self.max_delay {
            delay = self.max_delay;
        }
        delay + self.jitter.sample()
    }
}

/// Clock that records requested sleeps instead of waiting.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct VirtualClock {
    slept: std::sync::Arc<std::sync::Mutex<Vec<Duration>>>,
    today: NaiveDate,
}

#[cfg(test)]
impl VirtualClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            slept: Default::default(),
            today,
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps().iter().sum()
    }
}

#[cfg(test)]
impl Clock for VirtualClock {
    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_range_sample_within_bounds() {
        let range = DelayRange::from_millis(100, 250);
        for _ in 0..200 {
            let d = range.sample();
            assert!(d >= Duration::from_millis(100) && d <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_delay_range_swapped_bounds() {
        let range = DelayRange::from_millis(500, 10);
        assert_eq!(range.min, Duration::from_millis(10));
        assert_eq!(range.max, Duration::from_millis(500));
    }

    #[test]
    fn test_fixed_range_is_deterministic() {
        let range = DelayRange::fixed(Duration::from_secs(3));
        assert_eq!(range.sample(), Duration::from_secs(3));
        assert_eq!(DelayRange::zero().sample(), Duration::ZERO);
    }

    #[test]
    fn test_retry_policy_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            jitter: DelayRange::zero(),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(60), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_policy_adds_jitter() {
        let policy = RetryPolicy::constant(
            3,
            Duration::from_secs(2),
            DelayRange::from_millis(0, 250),
        );
        for attempt in 1..=3 {
            let d = policy.delay_for(attempt);
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_millis(2250));
        }
    }

    #[tokio::test]
    async fn test_virtual_clock_records_without_waiting() {
        let clock = VirtualClock::new(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        let started = std::time::Instant::now();
        clock.sleep(Duration::from_secs(3600)).await;
        clock.clone().sleep(Duration::from_secs(1)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(clock.sleeps().len(), 2);
        assert_eq!(clock.total_slept(), Duration::from_secs(3601));
    }
}
