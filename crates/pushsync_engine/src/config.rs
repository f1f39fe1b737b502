//! Configuration for the messaging client.

use pushsync_protocol::keys::DEFAULT_PLATFORM_TYPE;
use rand::Rng;
use std::time::Duration;

/// Configuration for a messaging client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Application code sent with every request.
    pub application_code: String,
    /// Base URL of the remote API.
    pub base_url: String,
    /// Platform identifier sent with registration and sync.
    pub platform_type: String,
    /// Message fetching settings.
    pub fetching: FetchingSettings,
    /// Pacing between retry attempts.
    pub retry: RetryConfig,
    /// Request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Creates a new client configuration.
    pub fn new(application_code: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            application_code: application_code.into(),
            base_url: base_url.into(),
            platform_type: DEFAULT_PLATFORM_TYPE.to_string(),
            fetching: FetchingSettings::default(),
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the platform type.
    pub fn with_platform_type(mut self, platform_type: impl Into<String>) -> Self {
        self.platform_type = platform_type.into();
        self
    }

    /// Sets the fetching settings.
    pub fn with_fetching(mut self, fetching: FetchingSettings) -> Self {
        self.fetching = fetching;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

/// Bounds for one message fetching cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchingSettings {
    /// Reported messages older than this are not sent as archive ids.
    pub archive_retention: chrono::Duration,
    /// Maximum number of archive ids per cycle.
    pub fetch_limit: usize,
    /// Fetching may trigger handling, which may trigger fetching again.
    /// Handling is not started once the iteration reaches this limit.
    pub iteration_limit: u32,
}

impl FetchingSettings {
    /// Sets the archive retention window.
    pub fn with_archive_retention(mut self, retention: chrono::Duration) -> Self {
        self.archive_retention = retention;
        self
    }

    /// Sets the archive fetch limit.
    pub fn with_fetch_limit(mut self, limit: usize) -> Self {
        self.fetch_limit = limit;
        self
    }

    /// Sets the recursive handling limit.
    pub fn with_iteration_limit(mut self, limit: u32) -> Self {
        self.iteration_limit = limit;
        self
    }
}

impl Default for FetchingSettings {
    fn default() -> Self {
        Self {
            archive_retention: chrono::Duration::days(7),
            fetch_limit: 100,
            iteration_limit: 2,
        }
    }
}

/// Pacing between retry attempts.
///
/// How many attempts a call gets is decided by its request descriptor;
/// this only controls how long to wait between them.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a configuration that retries without waiting.
    pub fn immediate() -> Self {
        Self {
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

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Calculates the delay before the given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Up to 25% on top
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_config_builder() {
        let config = ClientConfig::new("app-code", "https://push.example.com")
            .with_platform_type("GCM")
            .with_timeout(Duration::from_secs(60));

        assert_eq!(config.application_code, "app-code");
        assert_eq!(config.base_url, "https://push.example.com");
        assert_eq!(config.platform_type, "GCM");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn fetching_defaults() {
        let settings = FetchingSettings::default();
        assert_eq!(settings.archive_retention, chrono::Duration::days(7));
        assert_eq!(settings.fetch_limit, 100);
        assert_eq!(settings.iteration_limit, 2);
    }

    #[test]
    fn retry_immediate_has_no_delay() {
        let config = RetryConfig::immediate();
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        // Jitter adds at most 25%
        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::default()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);

        assert_eq!(config.delay_for_attempt(5), Duration::from_secs(5));
    }
}
