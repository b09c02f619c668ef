//! Estado de prueba: store en memoria y un nodo falso.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use ledger_cache_core::TtlPolicy;
use ledger_cache_server::{AppState, ChainReads, create_router};
use ledger_cache_store::{CacheStore, StoreConfig};
use ledger_cache_watch::ProviderError;
use metrics_exporter_prometheus::PrometheusBuilder;

use super::client::TestClient;

/// Nodo falso que cuenta las lecturas recibidas.
#[derive(Default)]
pub struct FakeChain {
    pub calls: AtomicUsize,
    pub unreachable: AtomicBool,
}

impl FakeChain {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn read(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ProviderError::transport("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReads for FakeChain {
    async fn contract_exists(&self, address: &str) -> Result<bool, ProviderError> {
        self.read()?;
        Ok(address.to_lowercase().ends_with("da"))
    }

    async fn balance_of(&self, _token: &str, user: &str) -> Result<String, ProviderError> {
        self.read()?;
        Ok(format!("{}", user.len() * 100))
    }

    async fn allowance(
        &self,
        _token: &str,
        _user: &str,
        _spender: &str,
    ) -> Result<String, ProviderError> {
        self.read()?;
        Ok("42".to_string())
    }
}

pub struct Fixture {
    pub store: Arc<CacheStore>,
    pub chain: Arc<FakeChain>,
    pub state: AppState,
}

impl Fixture {
    pub fn client(&self) -> TestClient {
        self.client_with(self.state.clone())
    }

    pub fn client_with(&self, state: AppState) -> TestClient {
        let prometheus = PrometheusBuilder::new().build_recorder().handle();
        TestClient::new(create_router(state, prometheus))
    }
}

pub fn fixture() -> Fixture {
    let store = Arc::new(CacheStore::in_memory(StoreConfig::default()).unwrap());
    let chain = Arc::new(FakeChain::default());
    let state = AppState::new(Arc::clone(&store), TtlPolicy::default(), chain.clone());

    Fixture {
        store,
        chain,
        state,
    }
}
