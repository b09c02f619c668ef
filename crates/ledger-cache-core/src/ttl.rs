//! Per-category time-to-live policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::keys::CacheCategory;

/// Lifetime assigned to each cache category.
///
/// Durations are (de)serialized as integer milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TtlPolicy {
    #[serde(with = "duration_ms")]
    balance: Duration,

    #[serde(with = "duration_ms")]
    total_balance: Duration,

    #[serde(with = "duration_ms")]
    allowance: Duration,

    #[serde(with = "duration_ms")]
    token_support: Duration,

    #[serde(with = "duration_ms")]
    contract_exists: Duration,

    #[serde(with = "duration_ms")]
    encrypt: Duration,

    #[serde(with = "duration_ms")]
    decrypt: Duration,

    #[serde(with = "duration_ms")]
    public_decrypt: Duration,

    #[serde(with = "duration_ms")]
    network_info: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            balance: Duration::from_secs(15),
            total_balance: Duration::from_secs(20),
            allowance: Duration::from_secs(30),
            token_support: Duration::from_secs(60),
            contract_exists: Duration::from_secs(300),
            encrypt: Duration::from_secs(60),
            decrypt: Duration::from_secs(30),
            public_decrypt: Duration::from_secs(30),
            network_info: Duration::from_secs(60),
        }
    }
}

impl TtlPolicy {
    /// Returns the TTL for a category.
    pub fn ttl_for(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::Balance => self.balance,
            CacheCategory::TotalBalance => self.total_balance,
            CacheCategory::Allowance => self.allowance,
            CacheCategory::TokenSupport => self.token_support,
            CacheCategory::ContractExists => self.contract_exists,
            CacheCategory::Encrypt => self.encrypt,
            CacheCategory::Decrypt => self.decrypt,
            CacheCategory::PublicDecrypt => self.public_decrypt,
            CacheCategory::NetworkInfo => self.network_info,
        }
    }

    /// Overrides the TTL of one category.
    pub fn with_ttl(mut self, category: CacheCategory, ttl: Duration) -> Self {
        let slot = match category {
            CacheCategory::Balance => &mut self.balance,
            CacheCategory::TotalBalance => &mut self.total_balance,
            CacheCategory::Allowance => &mut self.allowance,
            CacheCategory::TokenSupport => &mut self.token_support,
            CacheCategory::ContractExists => &mut self.contract_exists,
            CacheCategory::Encrypt => &mut self.encrypt,
            CacheCategory::Decrypt => &mut self.decrypt,
            CacheCategory::PublicDecrypt => &mut self.public_decrypt,
            CacheCategory::NetworkInfo => &mut self.network_info,
        };
        *slot = ttl;
        self
    }
}

/// Serde helper for `Duration` fields stored as milliseconds.
/// Milliseconds in `duration`, saturating at `u64::MAX`.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub mod duration_ms {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(super::millis(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        let policy = TtlPolicy::default();

        assert_eq!(policy.ttl_for(CacheCategory::Balance), Duration::from_millis(15_000));
        assert_eq!(policy.ttl_for(CacheCategory::TotalBalance), Duration::from_millis(20_000));
        assert_eq!(policy.ttl_for(CacheCategory::Allowance), Duration::from_millis(30_000));
        assert_eq!(policy.ttl_for(CacheCategory::TokenSupport), Duration::from_millis(60_000));
        assert_eq!(
            policy.ttl_for(CacheCategory::ContractExists),
            Duration::from_millis(300_000)
        );
        assert_eq!(policy.ttl_for(CacheCategory::Encrypt), Duration::from_millis(60_000));
        assert_eq!(policy.ttl_for(CacheCategory::Decrypt), Duration::from_millis(30_000));
    }

    #[test]
    fn test_with_ttl_overrides_single_category() {
        let policy =
            TtlPolicy::default().with_ttl(CacheCategory::Balance, Duration::from_secs(1));

        assert_eq!(policy.ttl_for(CacheCategory::Balance), Duration::from_secs(1));
        assert_eq!(policy.ttl_for(CacheCategory::TotalBalance), Duration::from_secs(20));
    }

    #[test]
    fn test_partial_deserialization_keeps_defaults() {
        let policy: TtlPolicy =
            serde_json::from_str(r#"{"balance": 5000, "contractExists": 1000}"#).unwrap();

        assert_eq!(policy.ttl_for(CacheCategory::Balance), Duration::from_secs(5));
        assert_eq!(policy.ttl_for(CacheCategory::ContractExists), Duration::from_secs(1));
        assert_eq!(policy.ttl_for(CacheCategory::Allowance), Duration::from_secs(30));
    }

    #[test]
    fn test_serializes_as_millis() {
        let json = serde_json::to_value(TtlPolicy::default()).unwrap();
        assert_eq!(json["totalBalance"], 20_000);
        assert_eq!(json["publicDecrypt"], 30_000);
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(250)), 250);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
