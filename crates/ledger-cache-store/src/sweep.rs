//! Periodic removal of expired entries.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use crate::store::CacheStore;
use crate::task::{TaskHandle, shutdown_requested};

impl CacheStore {
    /// Starts the background sweep, running every `cleanup_interval`.
    ///
    /// The sweep keeps the store alive until the handle is stopped or dropped.
    pub fn start_sweep(self: &Arc<Self>) -> TaskHandle {
        let store = Arc::clone(self);
        TaskHandle::spawn("cache-sweep", move |shutdown_rx| run_sweep(store, shutdown_rx))
    }
}

async fn run_sweep(store: Arc<CacheStore>, mut shutdown_rx: watch::Receiver<bool>) {
    let period = store.config().cleanup_interval();
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Starting cache sweep with interval {:?}", period);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut shutdown_rx) => {
                info!("Cache sweep shutting down");
                break;
            }
            _ = timer.tick() => {
                let purged = store.purge_expired().await;
                debug!(purged = purged, remaining = store.len(), "Cache sweep completed");
            }
        }
    }
}
