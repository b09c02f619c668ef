//! Cache store configuration.

use std::time::Duration;

use ledger_cache_core::duration_ms;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Configuracion del store.
///
/// Las duraciones se serializan en milisegundos.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// TTL usado cuando `set` no recibe uno (default: 30s).
    #[serde(default = "default_ttl", with = "duration_ms")]
    default_ttl: Duration,

    /// Maximo numero de entries (default: 1000).
    #[serde(default = "default_max_size")]
    max_size: usize,

    /// Intervalo del barrido de entries expiradas (default: 60s).
    #[serde(default = "default_cleanup_interval", with = "duration_ms")]
    cleanup_interval: Duration,
}

fn default_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_max_size() -> usize {
    1000
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: default_ttl(),
            max_size: default_max_size(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

impl StoreConfig {
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Numero de entries que se desalojan cuando el store esta lleno.
    pub fn eviction_batch(&self) -> usize {
        self.max_size.div_ceil(10)
    }

    /// Valida la configuracion.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.max_size == 0 {
            return Err(StoreError::InvalidConfig(
                "maxSize must be at least 1".to_string(),
            ));
        }
        if self.cleanup_interval.is_zero() {
            return Err(StoreError::InvalidConfig(
                "cleanupInterval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.default_ttl(), Duration::from_millis(30_000));
        assert_eq!(config.max_size(), 1000);
        assert_eq!(config.cleanup_interval(), Duration::from_millis(60_000));
        assert_eq!(config.eviction_batch(), 100);
    }

    #[test]
    fn test_eviction_batch_rounds_up() {
        assert_eq!(StoreConfig::default().with_max_size(1).eviction_batch(), 1);
        assert_eq!(StoreConfig::default().with_max_size(15).eviction_batch(), 2);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config = StoreConfig::default().with_max_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"defaultTtl": 1000, "maxSize": 10}"#).unwrap();

        assert_eq!(config.default_ttl(), Duration::from_secs(1));
        assert_eq!(config.max_size(), 10);
        assert_eq!(config.cleanup_interval(), Duration::from_secs(60));
    }
}
