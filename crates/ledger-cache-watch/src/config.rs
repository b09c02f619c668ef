//! Watcher configuration.

use std::time::Duration;

use ledger_cache_core::duration_ms;
use serde::{Deserialize, Serialize};

use crate::error::WatchError;
use crate::retry::RetryPolicy;

/// Configuration for the watch supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    /// Subscription retries before falling back to polling.
    #[serde(default = "default_max_retries")]
    max_retries: u32,

    /// Base delay for exponential retry backoff.
    #[serde(default = "default_retry_base_delay", with = "duration_ms")]
    retry_base_delay: Duration,

    /// Interval between polling ticks.
    #[serde(default = "default_polling_interval", with = "duration_ms")]
    polling_interval: Duration,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_polling_interval() -> Duration {
    Duration::from_secs(10)
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay: default_retry_base_delay(),
            polling_interval: default_polling_interval(),
        }
    }
}

impl WatchConfig {
    /// Returns the maximum number of subscription retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the base retry delay.
    pub fn retry_base_delay(&self) -> Duration {
        self.retry_base_delay
    }

    /// Returns the polling interval.
    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Builds the retry policy for subscription setup.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.retry_base_delay)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.polling_interval.is_zero() {
            return Err(WatchError::InvalidConfig(
                "pollingInterval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_config_default() {
        let config = WatchConfig::default();
        assert_eq!(config.max_retries(), 3);
        assert_eq!(config.retry_base_delay(), Duration::from_secs(1));
        assert_eq!(config.polling_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_deserialize_millis() {
        let config: WatchConfig =
            serde_json::from_str(r#"{"maxRetries": 5, "pollingInterval": 2500}"#).unwrap();

        assert_eq!(config.max_retries(), 5);
        assert_eq!(config.polling_interval(), Duration::from_millis(2500));
        assert_eq!(config.retry_base_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_polling_interval_is_rejected() {
        let config = WatchConfig::default().with_polling_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
