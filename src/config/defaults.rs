//! Process-wide transaction defaults.

use std::time::Duration;

/// Built-in global transaction timeout.
pub const DEFAULT_GLOBAL_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Built-in number of lock retries after the first attempt.
pub const DEFAULT_LOCK_RETRY_TIMES: i32 = 30;

/// Built-in wait between lock attempts.
pub const DEFAULT_LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Defaults shared by every transactional call site in the process.
///
/// A call site's declaration falls back to these values for any setting it
/// leaves unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalDefaults {
    /// Process-wide timeout override. `None` uses the built-in default.
    pub default_timeout: Option<Duration>,
    /// Lock retries after the first attempt. Negative means none.
    pub lock_retry_times: i32,
    /// Wait between lock attempts.
    pub lock_retry_interval: Duration,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        Self {
            default_timeout: None,
            lock_retry_times: DEFAULT_LOCK_RETRY_TIMES,
            lock_retry_interval: DEFAULT_LOCK_RETRY_INTERVAL,
        }
    }
}

impl GlobalDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the process-wide timeout override.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Set the process-wide lock retry count.
    pub fn lock_retry_times(mut self, times: i32) -> Self {
        self.lock_retry_times = times;
        self
    }

    /// Set the process-wide lock retry interval.
    pub fn lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval = interval;
        self
    }

    /// The timeout applied when a declaration leaves it unset.
    pub fn effective_timeout(&self) -> Duration {
        self.default_timeout
            .unwrap_or(DEFAULT_GLOBAL_TRANSACTION_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_defaults() {
        let defaults = GlobalDefaults::default();
        assert_eq!(defaults.effective_timeout(), Duration::from_millis(60_000));
        assert_eq!(defaults.lock_retry_times, 30);
        assert_eq!(defaults.lock_retry_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_overrides() {
        let defaults = GlobalDefaults::new()
            .default_timeout(Duration::from_secs(5))
            .lock_retry_times(3)
            .lock_retry_interval(Duration::from_millis(50));
        assert_eq!(defaults.effective_timeout(), Duration::from_secs(5));
        assert_eq!(defaults.lock_retry_times, 3);
    }
}
