//! Invalidacion de grupos de entries.
//!
//! Las keys embeben las direcciones en lowercase, asi que invalidar un
//! principal es un `clear_pattern` sobre su direccion normalizada.

use ledger_cache_core::{CacheCategory, LedgerEvent, normalize_address};
use serde::Serialize;
use tracing::{debug, info};

use crate::metrics::EvictionReason;
use crate::store::CacheStore;

/// Categorias que guardan resultados de cifrado/descifrado.
pub const FHE_CATEGORIES: [CacheCategory; 3] = [
    CacheCategory::Encrypt,
    CacheCategory::Decrypt,
    CacheCategory::PublicDecrypt,
];

/// Resultado de una operación de invalidación.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationResult {
    /// Número de entries invalidadas.
    pub count: usize,
    /// Patrones aplicados.
    pub patterns: Vec<String>,
}

impl InvalidationResult {
    fn single(pattern: impl Into<String>, count: usize) -> Self {
        Self {
            count,
            patterns: vec![pattern.into()],
        }
    }

    /// Acumula otro resultado en este.
    pub fn merge(&mut self, other: InvalidationResult) {
        self.count += other.count;
        self.patterns.extend(other.patterns);
    }
}

impl CacheStore {
    /// Invalida todas las entradas que mencionan la direccion dada.
    ///
    /// Una direccion vacia no invalida nada.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use ledger_cache_store::{CacheStore, StoreConfig};
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let store = CacheStore::in_memory(StoreConfig::default()).unwrap();
    /// let result = store.invalidate_principal("0xA11CE").await;
    /// println!("Invalidated {} entries", result.count);
    /// # }
    /// ```
    pub async fn invalidate_principal(&self, address: &str) -> InvalidationResult {
        let pattern = normalize_address(address);
        if pattern.is_empty() {
            debug!("Skipping invalidation for empty principal");
            return InvalidationResult::default();
        }

        let count = self.clear_pattern(&pattern).await;
        InvalidationResult::single(pattern, count)
    }

    /// Invalida las entradas de un usuario.
    pub async fn invalidate_user(&self, user: &str) -> InvalidationResult {
        let result = self.invalidate_principal(user).await;
        info!(user = %normalize_address(user), count = result.count, "User cache invalidated");
        result
    }

    /// Invalida las entradas de un token.
    pub async fn invalidate_token(&self, token: &str) -> InvalidationResult {
        let result = self.invalidate_principal(token).await;
        info!(token = %normalize_address(token), count = result.count, "Token cache invalidated");
        result
    }

    /// Invalida varios principals; los repetidos o vacios se ignoran.
    pub async fn invalidate_principals<S: AsRef<str>>(&self, addresses: &[S]) -> InvalidationResult {
        let mut seen: Vec<String> = Vec::with_capacity(addresses.len());
        let mut total = InvalidationResult::default();

        for address in addresses {
            let normalized = normalize_address(address.as_ref());
            if normalized.is_empty() || seen.contains(&normalized) {
                continue;
            }
            total.merge(self.invalidate_principal(&normalized).await);
            seen.push(normalized);
        }
        total
    }

    /// Invalida usuario y token despues de un deposito.
    pub async fn invalidate_after_deposit(&self, user: &str, token: &str) -> InvalidationResult {
        let result = self.invalidate_principals(&[user, token]).await;
        info!(
            user = %normalize_address(user),
            token = %normalize_address(token),
            count = result.count,
            "Cache invalidated after deposit"
        );
        result
    }

    /// Invalida usuario y token despues de un retiro.
    pub async fn invalidate_after_withdrawal(
        &self,
        user: &str,
        token: &str,
    ) -> InvalidationResult {
        let result = self.invalidate_principals(&[user, token]).await;
        info!(
            user = %normalize_address(user),
            token = %normalize_address(token),
            count = result.count,
            "Cache invalidated after withdrawal"
        );
        result
    }

    /// Invalida solo los allowances de `user` sobre `token`.
    pub async fn invalidate_after_approval(&self, user: &str, token: &str) -> InvalidationResult {
        let pattern = format!(
            "{}{}:{}",
            CacheCategory::Allowance.prefix(),
            normalize_address(user),
            normalize_address(token)
        );
        let count = self.clear_pattern(&pattern).await;
        info!(pattern = %pattern, count = count, "Cache invalidated after approval");
        InvalidationResult::single(pattern, count)
    }

    /// Invalida todas las entradas de una categoria por prefijo exacto.
    ///
    /// `balance` no arrastra las entradas de `total-balance`.
    pub async fn invalidate_category(&self, category: CacheCategory) -> InvalidationResult {
        let count = self
            .remove_where(|key| category.owns(key), EvictionReason::Pattern)
            .await;
        info!(category = %category, count = count, "Cache category invalidated");
        InvalidationResult::single(category.prefix(), count)
    }

    /// Invalida varias categorias.
    pub async fn invalidate_categories(&self, categories: &[CacheCategory]) -> InvalidationResult {
        let mut total = InvalidationResult::default();
        for category in categories {
            total.merge(self.invalidate_category(*category).await);
        }
        total
    }

    /// Invalida los resultados de cifrado y descifrado.
    pub async fn invalidate_fhe(&self) -> InvalidationResult {
        self.invalidate_categories(&FHE_CATEGORIES).await
    }

    /// Aplica la invalidacion que corresponde a un evento del ledger.
    ///
    /// Transfer purga emisor, receptor y token; Deposit y Withdraw purgan
    /// usuario y token.
    pub async fn invalidate_for_event(&self, event: &LedgerEvent) -> InvalidationResult {
        let result = self.invalidate_principals(&event.principals()).await;
        info!(
            event = event.name(),
            count = result.count,
            patterns = ?result.patterns,
            "Cache invalidated by ledger event"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use ledger_cache_core::CacheKey;
    use serde_json::json;

    async fn seeded() -> CacheStore {
        let store = CacheStore::in_memory(StoreConfig::default()).unwrap();
        let keys = [
            CacheKey::balance("Alice", "TokenX", true),
            CacheKey::balance("Alice", "TokenY", false),
            CacheKey::total_balance("Alice", true),
            CacheKey::total_balance("Carol", true),
            CacheKey::allowance("Alice", "TokenX", "Spender"),
            CacheKey::allowance("Alice", "TokenY", "Spender"),
            CacheKey::token_support("TokenX"),
            CacheKey::encrypt(5, "Alice"),
            CacheKey::decrypt("0xhandle"),
        ];
        for key in keys {
            store.set(&key.to_string(), json!(1), None).await;
        }
        store
    }

    #[tokio::test]
    async fn test_invalidate_user_is_case_insensitive() {
        let store = seeded().await;

        let result = store.invalidate_user("ALICE").await;

        assert_eq!(result.count, 6);
        assert_eq!(result.patterns, vec!["alice".to_string()]);
        assert!(store.has(&CacheKey::total_balance("carol", true).to_string()).await);
    }

    #[tokio::test]
    async fn test_invalidate_token() {
        let store = seeded().await;

        let result = store.invalidate_token("TokenX").await;

        assert_eq!(result.count, 3);
        assert!(store.has(&CacheKey::balance("alice", "tokeny", false).to_string()).await);
    }

    #[tokio::test]
    async fn test_empty_principal_invalidates_nothing() {
        let store = seeded().await;

        let result = store.invalidate_principal("   ").await;

        assert_eq!(result, InvalidationResult::default());
        assert_eq!(store.len(), 9);
    }

    #[tokio::test]
    async fn test_invalidate_after_approval_keeps_other_tokens() {
        let store = seeded().await;

        let result = store.invalidate_after_approval("Alice", "TokenX").await;

        assert_eq!(result.count, 1);
        assert_eq!(result.patterns, vec!["allowance:alice:tokenx".to_string()]);
        assert!(
            store
                .has(&CacheKey::allowance("alice", "tokeny", "spender").to_string())
                .await
        );
        assert!(store.has(&CacheKey::balance("alice", "tokenx", true).to_string()).await);
    }

    #[tokio::test]
    async fn test_invalidate_after_deposit() {
        let store = seeded().await;

        let result = store.invalidate_after_deposit("Alice", "TokenX").await;

        // 6 alice keys + token-support:tokenx
        assert_eq!(result.count, 7);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_invalidate_category_uses_exact_prefix() {
        let store = seeded().await;

        let result = store.invalidate_category(CacheCategory::Balance).await;

        assert_eq!(result.count, 2);
        assert_eq!(result.patterns, vec!["balance:".to_string()]);
        assert!(store.has(&CacheKey::total_balance("alice", true).to_string()).await);
    }

    #[tokio::test]
    async fn test_invalidate_fhe() {
        let store = seeded().await;

        let result = store.invalidate_fhe().await;

        assert_eq!(result.count, 2);
        assert_eq!(result.patterns.len(), 3);
    }

    #[tokio::test]
    async fn test_invalidate_for_transfer_event() {
        let store = seeded().await;
        let event = LedgerEvent::transfer("Carol", "Alice", "TokenY", "1");

        let result = store.invalidate_for_event(&event).await;

        assert_eq!(result.patterns, vec!["carol", "alice", "tokeny"]);
        assert_eq!(store.keys(), vec![
            "decrypt:0xhandle".to_string(),
            "token-support:tokenx".to_string()
        ]);
    }

    #[tokio::test]
    async fn test_event_writes_snapshot_once_per_matched_principal() {
        let storage = std::sync::Arc::new(crate::persistence::MemoryStorage::new());
        let store = CacheStore::open(StoreConfig::default(), storage.clone())
            .await
            .unwrap();
        for key in [
            CacheKey::balance("alice", "tokeny", true),
            CacheKey::total_balance("bob", true),
            CacheKey::token_support("tokenx"),
            CacheKey::total_balance("carol", true),
        ] {
            store.set(&key.to_string(), json!(1), None).await;
        }
        let saves = storage.save_count();

        let transfer = LedgerEvent::transfer("alice", "bob", "tokenx", "1");
        assert_eq!(store.invalidate_for_event(&transfer).await.count, 3);
        assert_eq!(storage.save_count(), saves + 3);

        let deposit = LedgerEvent::deposit("dave", "tokenz", "1");
        assert_eq!(store.invalidate_for_event(&deposit).await.count, 0);
        assert_eq!(storage.save_count(), saves + 3);

        assert_eq!(
            storage.snapshot().unwrap().keys().cloned().collect::<Vec<_>>(),
            vec!["total-balance:carol:fhe".to_string()]
        );
    }
}
