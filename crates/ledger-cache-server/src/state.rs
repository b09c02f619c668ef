//! Application state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ledger_cache_core::TtlPolicy;
use ledger_cache_store::{CacheStore, DEFAULT_DEBOUNCE, Debouncer, RequestCoordinator};
use ledger_cache_watch::WatchMonitor;
use parking_lot::Mutex;

use crate::reads::ChainReads;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<CacheStore>,
    coordinator: RequestCoordinator,
    reads: Arc<dyn ChainReads>,
    watcher: Option<WatchMonitor>,
    debounce: Duration,
    refreshes: Arc<Mutex<HashMap<String, Debouncer>>>,
}

impl AppState {
    pub fn new(store: Arc<CacheStore>, ttl: TtlPolicy, reads: Arc<dyn ChainReads>) -> Self {
        Self {
            coordinator: RequestCoordinator::new(Arc::clone(&store), ttl),
            store,
            reads,
            watcher: None,
            debounce: DEFAULT_DEBOUNCE,
            refreshes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Attaches the supervisor of the configured session.
    pub fn with_watcher(mut self, watcher: WatchMonitor) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debounce = delay;
        self
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    pub fn reads(&self) -> Arc<dyn ChainReads> {
        Arc::clone(&self.reads)
    }

    pub fn watcher(&self) -> Option<&WatchMonitor> {
        self.watcher.as_ref()
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Schedules `refresh` under the debouncer of `key`, replacing any
    /// refresh still waiting for that key.
    pub fn schedule_refresh<F, Fut>(&self, key: &str, refresh: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut refreshes = self.refreshes.lock();
        refreshes.retain(|_, debouncer| debouncer.is_pending());
        refreshes
            .entry(key.to_string())
            .or_insert_with(|| Debouncer::new(self.debounce))
            .schedule(refresh);
    }

    /// Number of keys with a refresh waiting for its delay.
    pub fn pending_refreshes(&self) -> usize {
        self.refreshes
            .lock()
            .values()
            .filter(|debouncer| debouncer.is_pending())
            .count()
    }
}
