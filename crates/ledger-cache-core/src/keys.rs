//! Cache key generation and normalization.
//!
//! Every key that concerns a principal (a user or token/contract address)
//! embeds that address lowercased, so that all entries of a principal can be
//! dropped with a single substring match.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Normalizes an address for embedding in a key.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Normalizes an address and rejects it if nothing is left.
pub fn require_principal(role: &'static str, address: &str) -> Result<String, CoreError> {
    let normalized = normalize_address(address);
    if normalized.is_empty() {
        return Err(CoreError::EmptyPrincipal { role });
    }
    Ok(normalized)
}

/// Data category of a cache entry. Each category owns a fixed key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheCategory {
    Balance,
    TotalBalance,
    Allowance,
    TokenSupport,
    ContractExists,
    Encrypt,
    Decrypt,
    PublicDecrypt,
    NetworkInfo,
}

impl CacheCategory {
    /// All categories, in declaration order.
    pub const ALL: [CacheCategory; 9] = [
        CacheCategory::Balance,
        CacheCategory::TotalBalance,
        CacheCategory::Allowance,
        CacheCategory::TokenSupport,
        CacheCategory::ContractExists,
        CacheCategory::Encrypt,
        CacheCategory::Decrypt,
        CacheCategory::PublicDecrypt,
        CacheCategory::NetworkInfo,
    ];

    /// Returns the category name as used in keys and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            CacheCategory::Balance => "balance",
            CacheCategory::TotalBalance => "total-balance",
            CacheCategory::Allowance => "allowance",
            CacheCategory::TokenSupport => "token-support",
            CacheCategory::ContractExists => "contract-exists",
            CacheCategory::Encrypt => "encrypt",
            CacheCategory::Decrypt => "decrypt",
            CacheCategory::PublicDecrypt => "public-decrypt",
            CacheCategory::NetworkInfo => "network-info",
        }
    }

    /// Returns the key prefix, including the trailing separator.
    pub fn prefix(&self) -> String {
        format!("{}:", self.name())
    }

    /// Returns true if `key` was built for this category.
    ///
    /// Matches on the exact prefix, so `balance` does not claim
    /// `total-balance:` keys.
    pub fn owns(&self, key: &str) -> bool {
        key.strip_prefix(self.name())
            .is_some_and(|rest| rest.starts_with(':'))
    }

    /// Finds the category a raw key belongs to.
    pub fn of_key(key: &str) -> Option<CacheCategory> {
        Self::ALL.into_iter().find(|category| category.owns(key))
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CacheCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.name() == wanted)
            .ok_or_else(|| CoreError::unknown_category(s))
    }
}

/// Key unica para una lectura cacheada.
///
/// Los constructores normalizan las direcciones a lowercase.
///
/// # Examples
///
/// ```
/// use ledger_cache_core::CacheKey;
///
/// let key = CacheKey::balance("0xAbC", "0xDeF", true);
/// assert_eq!(key.to_string(), "balance:0xabc:0xdef:fhe");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Balance { user: String, token: String, fhe: bool },
    TotalBalance { user: String, fhe: bool },
    Allowance { user: String, token: String, spender: String },
    TokenSupport { token: String },
    ContractExists { address: String },
    Encrypt { value: u128, user: String },
    Decrypt { handle: String },
    PublicDecrypt { handle: String },
    NetworkInfo { chain_id: String },
}

impl CacheKey {
    /// Balance of `token` held by `user`; `fhe` tells whether the private part was decrypted.
    pub fn balance(user: &str, token: &str, fhe: bool) -> Self {
        Self::Balance {
            user: normalize_address(user),
            token: normalize_address(token),
            fhe,
        }
    }

    /// Aggregated balance of `user` across all supported tokens.
    pub fn total_balance(user: &str, fhe: bool) -> Self {
        Self::TotalBalance {
            user: normalize_address(user),
            fhe,
        }
    }

    /// Allowance granted by `user` to `spender` over `token`.
    pub fn allowance(user: &str, token: &str, spender: &str) -> Self {
        Self::Allowance {
            user: normalize_address(user),
            token: normalize_address(token),
            spender: normalize_address(spender),
        }
    }

    /// Whether the ledger contract accepts `token`.
    pub fn token_support(token: &str) -> Self {
        Self::TokenSupport {
            token: normalize_address(token),
        }
    }

    /// Whether code is deployed at `address`.
    pub fn contract_exists(address: &str) -> Self {
        Self::ContractExists {
            address: normalize_address(address),
        }
    }

    /// Encrypted input produced for `value` on behalf of `user`.
    pub fn encrypt(value: u128, user: &str) -> Self {
        Self::Encrypt {
            value,
            user: normalize_address(user),
        }
    }

    /// User decryption of a ciphertext handle.
    pub fn decrypt(handle: impl Into<String>) -> Self {
        Self::Decrypt {
            handle: handle.into(),
        }
    }

    /// Public decryption of a ciphertext handle.
    pub fn public_decrypt(handle: impl Into<String>) -> Self {
        Self::PublicDecrypt {
            handle: handle.into(),
        }
    }

    /// Network metadata for a chain id.
    pub fn network_info(chain_id: impl Into<String>) -> Self {
        Self::NetworkInfo {
            chain_id: chain_id.into(),
        }
    }

    /// Returns the category of this key.
    pub fn category(&self) -> CacheCategory {
        match self {
            CacheKey::Balance { .. } => CacheCategory::Balance,
            CacheKey::TotalBalance { .. } => CacheCategory::TotalBalance,
            CacheKey::Allowance { .. } => CacheCategory::Allowance,
            CacheKey::TokenSupport { .. } => CacheCategory::TokenSupport,
            CacheKey::ContractExists { .. } => CacheCategory::ContractExists,
            CacheKey::Encrypt { .. } => CacheCategory::Encrypt,
            CacheKey::Decrypt { .. } => CacheCategory::Decrypt,
            CacheKey::PublicDecrypt { .. } => CacheCategory::PublicDecrypt,
            CacheKey::NetworkInfo { .. } => CacheCategory::NetworkInfo,
        }
    }

    /// Returns the addresses embedded in this key.
    pub fn principals(&self) -> Vec<&str> {
        match self {
            CacheKey::Balance { user, token, .. } => vec![user, token],
            CacheKey::TotalBalance { user, .. } => vec![user],
            CacheKey::Allowance {
                user,
                token,
                spender,
            } => vec![user, token, spender],
            CacheKey::TokenSupport { token } => vec![token],
            CacheKey::ContractExists { address } => vec![address],
            CacheKey::Encrypt { user, .. } => vec![user],
            CacheKey::Decrypt { .. }
            | CacheKey::PublicDecrypt { .. }
            | CacheKey::NetworkInfo { .. } => Vec::new(),
        }
    }
}

fn fhe_flag(fhe: bool) -> &'static str {
    if fhe { "fhe" } else { "no-fhe" }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.category().name();
        match self {
            CacheKey::Balance { user, token, fhe } => {
                write!(f, "{}:{}:{}:{}", prefix, user, token, fhe_flag(*fhe))
            },
            CacheKey::TotalBalance { user, fhe } => {
                write!(f, "{}:{}:{}", prefix, user, fhe_flag(*fhe))
            },
            CacheKey::Allowance {
                user,
                token,
                spender,
            } => write!(f, "{}:{}:{}:{}", prefix, user, token, spender),
            CacheKey::TokenSupport { token } => write!(f, "{}:{}", prefix, token),
            CacheKey::ContractExists { address } => write!(f, "{}:{}", prefix, address),
            CacheKey::Encrypt { value, user } => write!(f, "{}:{}:{}", prefix, value, user),
            CacheKey::Decrypt { handle } | CacheKey::PublicDecrypt { handle } => {
                write!(f, "{}:{}", prefix, handle)
            },
            CacheKey::NetworkInfo { chain_id } => write!(f, "{}:{}", prefix, chain_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0xA11CE00000000000000000000000000000000001";
    const TOKEN: &str = "0x70KE000000000000000000000000000000000002";

    #[test]
    fn test_key_normalization() {
        let key1 = CacheKey::balance(ALICE, TOKEN, true);
        let key2 = CacheKey::balance(&ALICE.to_lowercase(), &TOKEN.to_lowercase(), true);

        assert_eq!(key1, key2);
        assert_eq!(
            key1.to_string(),
            "balance:0xa11ce00000000000000000000000000000000001:0x70ke000000000000000000000000000000000002:fhe"
        );
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(
            CacheKey::total_balance("Bob", false).to_string(),
            "total-balance:bob:no-fhe"
        );
        assert_eq!(
            CacheKey::allowance("Alice", "TokenX", "Spender").to_string(),
            "allowance:alice:tokenx:spender"
        );
        assert_eq!(
            CacheKey::token_support("TokenX").to_string(),
            "token-support:tokenx"
        );
        assert_eq!(
            CacheKey::contract_exists("0xABC").to_string(),
            "contract-exists:0xabc"
        );
        assert_eq!(CacheKey::encrypt(42, "Alice").to_string(), "encrypt:42:alice");
        assert_eq!(CacheKey::decrypt("0xFF").to_string(), "decrypt:0xFF");
        assert_eq!(
            CacheKey::public_decrypt("0xFF").to_string(),
            "public-decrypt:0xFF"
        );
        assert_eq!(
            CacheKey::network_info("11155111").to_string(),
            "network-info:11155111"
        );
    }

    #[test]
    fn test_principal_is_substring_of_key() {
        let keys = [
            CacheKey::balance(ALICE, TOKEN, false),
            CacheKey::total_balance(ALICE, true),
            CacheKey::allowance(ALICE, TOKEN, TOKEN),
            CacheKey::encrypt(7, ALICE),
        ];

        for key in keys {
            let rendered = key.to_string();
            assert!(rendered.contains(&ALICE.to_lowercase()), "{rendered}");
            for principal in key.principals() {
                assert!(rendered.contains(principal));
            }
        }
    }

    #[test]
    fn test_category_round_trip() {
        for category in CacheCategory::ALL {
            assert_eq!(category.name().parse::<CacheCategory>(), Ok(category));
        }
        assert!("balances".parse::<CacheCategory>().is_err());
    }

    #[test]
    fn test_category_owns_exact_prefix() {
        let balance = CacheKey::balance("alice", "tokenx", true).to_string();
        let total = CacheKey::total_balance("alice", true).to_string();
        let decrypt = CacheKey::decrypt("0x01").to_string();
        let public = CacheKey::public_decrypt("0x01").to_string();

        assert!(CacheCategory::Balance.owns(&balance));
        assert!(!CacheCategory::Balance.owns(&total));
        assert!(!CacheCategory::Decrypt.owns(&public));
        assert_eq!(CacheCategory::of_key(&total), Some(CacheCategory::TotalBalance));
        assert_eq!(CacheCategory::of_key(&decrypt), Some(CacheCategory::Decrypt));
        assert_eq!(CacheCategory::of_key("unrelated"), None);
    }

    #[test]
    fn test_require_principal() {
        assert_eq!(require_principal("user", " 0xAB ").unwrap(), "0xab");
        assert_eq!(
            require_principal("user", "   "),
            Err(CoreError::EmptyPrincipal { role: "user" })
        );
    }

    #[test]
    fn test_key_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(CacheKey::token_support("TokenX"));

        assert!(set.contains(&CacheKey::token_support("tokenx")));
    }
}
