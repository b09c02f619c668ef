//! Push-based invalidation from a live event subscription.

use std::sync::Arc;

use ledger_cache_core::LedgerEvent;
use ledger_cache_store::{CacheStore, shutdown_requested};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::provider::{ChainProvider, Subscription};
use crate::state::WatchStats;

/// How a watcher loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherExit {
    /// Shutdown was requested.
    Shutdown,
    /// The provider closed the event stream.
    StreamClosed,
}

/// Applies ledger events from a subscription to the cache.
#[derive(Debug, Clone)]
pub struct EventWatcher {
    store: Arc<CacheStore>,
    stats: Arc<WatchStats>,
}

impl EventWatcher {
    pub fn new(store: Arc<CacheStore>, stats: Arc<WatchStats>) -> Self {
        Self { store, stats }
    }

    /// Opens the subscription for the three ledger events.
    pub async fn setup(provider: &dyn ChainProvider) -> Result<Subscription, ProviderError> {
        debug!(provider = provider.name(), "Subscribing to ledger events");
        provider.subscribe().await
    }

    /// Applies one event.
    pub async fn handle(&self, event: &LedgerEvent) -> usize {
        let result = self.store.invalidate_for_event(event).await;
        self.stats.record_event(result.count);
        result.count
    }

    /// Consumes events until shutdown or until the stream ends.
    ///
    /// Shutdown is checked before every event, so nothing is applied once
    /// teardown has been requested.
    pub async fn run(
        &self,
        mut subscription: Subscription,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> WatcherExit {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(shutdown_rx) => {
                    info!("Event watcher shutting down");
                    return WatcherExit::Shutdown;
                }
                next = subscription.recv() => {
                    let Some(event) = next else {
                        return WatcherExit::StreamClosed;
                    };
                    if *shutdown_rx.borrow() {
                        return WatcherExit::Shutdown;
                    }
                    self.handle(&event).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_cache_core::CacheKey;
    use ledger_cache_store::StoreConfig;
    use serde_json::json;
    use tokio::sync::mpsc;

    async fn store_with(keys: &[CacheKey]) -> Arc<CacheStore> {
        let store = Arc::new(CacheStore::in_memory(StoreConfig::default()).unwrap());
        for key in keys {
            store.set(&key.to_string(), json!(1), None).await;
        }
        store
    }

    #[tokio::test]
    async fn test_run_applies_events_until_stream_closes() {
        let store = store_with(&[
            CacheKey::balance("alice", "tokenx", true),
            CacheKey::balance("carol", "tokeny", true),
        ])
        .await;
        let stats = Arc::new(WatchStats::new());
        let watcher = EventWatcher::new(Arc::clone(&store), Arc::clone(&stats));

        let (tx, rx) = mpsc::channel(8);
        tx.send(LedgerEvent::deposit("Alice", "TokenX", "1"))
            .await
            .unwrap();
        drop(tx);

        let (_shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let exit = watcher
            .run(Subscription::from_channel(rx), &mut shutdown_rx)
            .await;

        assert_eq!(exit, WatcherExit::StreamClosed);
        assert_eq!(store.keys(), vec!["balance:carol:tokeny:fhe".to_string()]);
        assert_eq!(stats.events_applied(), 1);
        assert_eq!(stats.entries_invalidated(), 1);
    }

    #[tokio::test]
    async fn test_no_event_applied_after_shutdown() {
        let store = store_with(&[CacheKey::balance("alice", "tokenx", true)]).await;
        let watcher = EventWatcher::new(Arc::clone(&store), Arc::new(WatchStats::new()));

        let (tx, rx) = mpsc::channel(8);
        tx.send(LedgerEvent::withdraw("alice", "tokenx", "1"))
            .await
            .unwrap();

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let exit = watcher
            .run(Subscription::from_channel(rx), &mut shutdown_rx)
            .await;

        assert_eq!(exit, WatcherExit::Shutdown);
        assert_eq!(store.len(), 1);
    }
}
