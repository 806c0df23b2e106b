//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the incremental sync.
    pub incremental_interval: Duration,
    /// Period of the full reconciliation.
    pub full_interval: Duration,
    /// Delay before the first full reconciliation.
    pub full_initial_delay: Duration,
    /// Period of the deletion-marker sweep; `None` disables it.
    pub cleanup_interval: Option<Duration>,
    /// Source column holding each row's last-modified timestamp.
    pub last_modified_field: String,
    /// Format of last-modified timestamps (chrono `strftime` syntax).
    pub timestamp_format: String,
    /// Primary keys per batch.
    pub batch_size: usize,
    /// Relative row-count drift below which a full sync counts as routine.
    pub drift_threshold: f64,
    /// How far back the first incremental sync of a table looks.
    pub initial_lookback: Duration,
    /// Retry configuration for batch reads and writes.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            incremental_interval: Duration::from_secs(10 * 60),
            full_interval: Duration::from_secs(24 * 60 * 60),
            full_initial_delay: Duration::from_secs(60 * 60),
            cleanup_interval: Some(Duration::from_secs(10 * 60)),
            last_modified_field: "update_time".to_string(),
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            batch_size: 1000,
            drift_threshold: 0.01,
            initial_lookback: Duration::from_secs(24 * 60 * 60),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the incremental sync period.
    pub fn with_incremental_interval(mut self, interval: Duration) -> Self {
        self.incremental_interval = interval;
        self
    }

    /// Sets the full reconciliation period.
    pub fn with_full_interval(mut self, interval: Duration) -> Self {
        self.full_interval = interval;
        self
    }

    /// Sets the delay before the first full reconciliation.
    pub fn with_full_initial_delay(mut self, delay: Duration) -> Self {
        self.full_initial_delay = delay;
        self
    }

    /// Sets or disables the marker sweep period.
    pub fn with_cleanup_interval(mut self, interval: Option<Duration>) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Sets the last-modified column.
    pub fn with_last_modified_field(mut self, field: impl Into<String>) -> Self {
        self.last_modified_field = field.into();
        self
    }

    /// Sets the timestamp format.
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    /// Sets the batch size. Zero is treated as one.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the drift threshold.
    pub fn with_drift_threshold(mut self, threshold: f64) -> Self {
        self.drift_threshold = threshold;
        self
    }

    /// Sets the look-back of a table's first incremental sync.
    pub fn with_initial_lookback(mut self, lookback: Duration) -> Self {
        self.initial_lookback = lookback;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Disables jitter.
    pub fn without_jitter(mut self) -> Self {
        self.add_jitter = false;
        self
    }

    /// Calculates the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter && delay_secs > 0.0 {
            // Up to 25% extra
            let jitter = delay_secs * rand::thread_rng().gen_range(0.0..0.25);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.incremental_interval, Duration::from_secs(600));
        assert_eq!(config.full_interval, Duration::from_secs(86_400));
        assert_eq!(config.full_initial_delay, Duration::from_secs(3_600));
        assert_eq!(config.last_modified_field, "update_time");
        assert_eq!(config.batch_size, 1000);
        assert!((config.drift_threshold - 0.01).abs() < f64::EPSILON);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_batch_size(0)
            .with_last_modified_field("modified_at")
            .with_cleanup_interval(None)
            .with_retry(RetryConfig::no_retry());

        assert_eq!(config.batch_size, 1);
        assert_eq!(config.last_modified_field, "modified_at");
        assert_eq!(config.cleanup_interval, None);
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .without_jitter();
        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }
}
