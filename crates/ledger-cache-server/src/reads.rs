//! Lecturas de chain que el daemon coordina y cachea.

use async_trait::async_trait;
use ledger_cache_watch::{JsonRpcProvider, ProviderError};

/// Lecturas puntuales contra el nodo.
///
/// Separado de `ChainProvider` para poder servir el daemon con un doble
/// en tests sin levantar un nodo.
#[async_trait]
pub trait ChainReads: Send + Sync {
    /// Si hay codigo desplegado en `address`.
    async fn contract_exists(&self, address: &str) -> Result<bool, ProviderError>;

    /// `balanceOf(user)` del token, en decimal.
    async fn balance_of(&self, token: &str, user: &str) -> Result<String, ProviderError>;

    /// `allowance(user, spender)` del token, en decimal.
    async fn allowance(
        &self,
        token: &str,
        user: &str,
        spender: &str,
    ) -> Result<String, ProviderError>;
}

#[async_trait]
impl ChainReads for JsonRpcProvider {
    async fn contract_exists(&self, address: &str) -> Result<bool, ProviderError> {
        self.code_at(address).await
    }

    async fn balance_of(&self, token: &str, user: &str) -> Result<String, ProviderError> {
        self.erc20_balance_of(token, user).await
    }

    async fn allowance(
        &self,
        token: &str,
        user: &str,
        spender: &str,
    ) -> Result<String, ProviderError> {
        self.erc20_allowance(token, user, spender).await
    }
}
