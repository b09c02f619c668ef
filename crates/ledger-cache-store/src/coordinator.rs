//! Coordinacion de lecturas: primero la cache, luego un unico fetch compartido por key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use ledger_cache_core::{CacheCategory, CacheKey, TtlPolicy};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::CoordinatorError;
use crate::store::CacheStore;

type FetchResult = Result<Value, CoordinatorError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;
type InFlight = Arc<Mutex<HashMap<String, SharedFetch>>>;

/// Retira el ticket en curso cuando termina la tarea del fetch, incluso si hace panic.
struct Ticket {
    key: String,
    in_flight: InFlight,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.key);
    }
}

/// Coordina lecturas de la cadena sobre el [`CacheStore`].
///
/// 1. Hit en cache: se devuelve sin I/O.
/// 2. Fetch en curso para la misma key: se espera ese resultado.
/// 3. Si no, se lanza un fetch en su propia tarea y se cachea el exito con el
///    TTL de la categoria. Los errores nunca se cachean.
///
/// El fetch lanzado termina aunque todos los llamadores se cancelen.
#[derive(Clone)]
pub struct RequestCoordinator {
    store: Arc<CacheStore>,
    ttl: TtlPolicy,
    in_flight: InFlight,
}

impl RequestCoordinator {
    pub fn new(store: Arc<CacheStore>, ttl: TtlPolicy) -> Self {
        Self {
            store,
            ttl,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttl
    }

    /// Numero de fetches en curso.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight.lock().contains_key(&key.to_string())
    }

    /// Devuelve el valor de `key`, usando `fetch` solo si hace falta.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use ledger_cache_core::{CacheKey, TtlPolicy};
    /// # use ledger_cache_store::{CacheStore, RequestCoordinator, StoreConfig};
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let store = Arc::new(CacheStore::in_memory(StoreConfig::default()).unwrap());
    /// let coordinator = RequestCoordinator::new(store, TtlPolicy::default());
    /// let key = CacheKey::token_support("0xTokenX");
    ///
    /// let supported: bool = coordinator
    ///     .fetch(&key, || async { Ok(true) })
    ///     .await
    ///     .unwrap();
    /// # }
    /// ```
    pub async fn fetch<T, F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<T, CoordinatorError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let key_str = key.to_string();

        if let Some(value) = self.store.get(&key_str).await {
            return decode(&key_str, value);
        }

        let pending = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key_str) {
                Some(existing) => {
                    debug!(key = %key_str, "Joining in-flight fetch");
                    existing.clone()
                },
                None => {
                    let pending = self.spawn_fetch(key_str.clone(), key.category(), fetch());
                    in_flight.insert(key_str.clone(), pending.clone());
                    pending
                },
            }
        };

        let value = pending.await?;
        decode(&key_str, value)
    }

    fn spawn_fetch<T, Fut>(&self, key: String, category: CacheCategory, fut: Fut) -> SharedFetch
    where
        T: Serialize + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let ttl = self.ttl.ttl_for(category);
        let ticket = Ticket {
            key: key.clone(),
            in_flight: Arc::clone(&self.in_flight),
        };

        debug!(key = %key, "Starting fetch");
        let task = tokio::spawn(async move {
            let ticket = ticket;
            let key = ticket.key.as_str();

            let value = fut.await.map_err(|e| CoordinatorError::fetch(key, &e))?;
            let value =
                serde_json::to_value(value).map_err(|e| CoordinatorError::decode(key, &e))?;

            store.set(key, value.clone(), Some(ttl)).await;
            Ok(value)
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(CoordinatorError::Join {
                    key,
                    message: e.to_string(),
                }),
            }
        }
        .boxed()
        .shared()
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, CoordinatorError> {
    serde_json::from_value(value).map_err(|e| CoordinatorError::decode(key, &e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn coordinator() -> RequestCoordinator {
        let store = Arc::new(CacheStore::in_memory(StoreConfig::default()).unwrap());
        RequestCoordinator::new(store, TtlPolicy::default())
    }

    #[tokio::test]
    async fn test_fetch_populates_cache() {
        let coordinator = coordinator();
        let key = CacheKey::contract_exists("0xABC");
        let calls = Arc::new(AtomicU32::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            let exists: bool = coordinator
                .fetch(&key, move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                })
                .await
                .unwrap();
            assert!(exists);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.in_flight_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_uses_category_ttl() {
        let coordinator = coordinator();
        let key = CacheKey::balance("alice", "tokenx", false);

        let _: String = coordinator
            .fetch(&key, || async { Ok("10".to_string()) })
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(15_001)).await;
        assert!(!coordinator.store().has(&key.to_string()).await);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let coordinator = coordinator();
        let key = CacheKey::token_support("0xT");

        let err = coordinator
            .fetch::<bool, _, _>(&key, || async { Err(anyhow::anyhow!("rpc down")) })
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::Fetch { .. }));
        assert!(!coordinator.store().has(&key.to_string()).await);
        assert!(!coordinator.is_in_flight(&key));

        let ok: bool = coordinator
            .fetch(&key, || async { Ok(true) })
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_are_coalesced() {
        let coordinator = coordinator();
        let key = CacheKey::total_balance("bob", true);
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = vec![];
        for _ in 0..10 {
            let coordinator = coordinator.clone();
            let key = key.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                coordinator
                    .fetch(&key, move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok(42u64)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_cancel_fetch() {
        let coordinator = coordinator();
        let key = CacheKey::network_info("1");
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let caller = {
            let coordinator = coordinator.clone();
            let key = key.clone();
            tokio::spawn(async move {
                coordinator
                    .fetch(&key, move || async move {
                        release_rx
                            .await
                            .map(|_| "mainnet".to_string())
                            .map_err(anyhow::Error::from)
                    })
                    .await
            })
        };

        while !coordinator.is_in_flight(&key) {
            tokio::task::yield_now().await;
        }
        caller.abort();
        release_tx.send(()).unwrap();

        while coordinator.is_in_flight(&key) {
            tokio::task::yield_now().await;
        }
        assert_eq!(
            coordinator.store().get(&key.to_string()).await,
            Some(serde_json::json!("mainnet"))
        );
    }

    #[tokio::test]
    async fn test_panicking_fetch_releases_ticket() {
        let coordinator = coordinator();
        let key = CacheKey::decrypt("0xdead");

        let err = coordinator
            .fetch::<String, _, _>(&key, || async {
                let handle: Option<String> = None;
                Ok(handle.expect("boom"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, CoordinatorError::Join { .. }));
        assert!(!coordinator.is_in_flight(&key));
    }
}
