//! Lock retry tuning.

use std::time::Duration;

use crate::config::GlobalDefaults;

/// How many times, and how often, to retry a conflicting lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetryPolicy {
    times: u32,
    interval: Duration,
}

impl LockRetryPolicy {
    pub fn new(times: u32, interval: Duration) -> Self {
        Self { times, interval }
    }

    /// Resolve declared settings against process defaults.
    ///
    /// A negative `declared_times` or a non-positive `declared_interval_ms`
    /// defers to `defaults`.
    pub fn resolve(declared_times: i32, declared_interval_ms: i64, defaults: &GlobalDefaults) -> Self {
        let times = if declared_times >= 0 {
            declared_times
        } else {
            defaults.lock_retry_times
        };

        let interval = if declared_interval_ms > 0 {
            Duration::from_millis(declared_interval_ms as u64)
        } else {
            defaults.lock_retry_interval
        };

        Self {
            times: times.max(0) as u32,
            interval,
        }
    }

    /// Retries after the first attempt.
    pub fn times(&self) -> u32 {
        self.times
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total attempts, including the first.
    pub fn attempts(&self) -> u32 {
        self.times.saturating_add(1)
    }
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self::resolve(-1, 0, &GlobalDefaults::default())
    }
}
