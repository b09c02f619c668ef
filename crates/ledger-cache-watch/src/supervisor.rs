//! Session supervisor: subscription with retries, polling as the fallback.

use std::sync::Arc;

use ledger_cache_core::require_principal;
use ledger_cache_store::{CacheStore, TaskHandle, shutdown_requested};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::WatchConfig;
use crate::error::{ProviderError, WatchError};
use crate::polling::PollingWatcher;
use crate::provider::{ChainProvider, Subscription};
use crate::state::{WatchReport, WatchStats, WatcherState};
use crate::subscription::{EventWatcher, WatcherExit};

/// The invalidation source selected by the supervisor.
pub enum Watcher {
    /// Push events from a live subscription.
    Subscription(EventWatcher, Subscription),
    /// Periodic block scans.
    Polling(PollingWatcher),
}

impl Watcher {
    pub fn state(&self) -> WatcherState {
        match self {
            Watcher::Subscription(..) => WatcherState::Active,
            Watcher::Polling(_) => WatcherState::Polling,
        }
    }

    /// Runs the watcher until shutdown or until its stream ends.
    pub async fn run(self, shutdown_rx: &mut watch::Receiver<bool>) -> WatcherExit {
        match self {
            Watcher::Subscription(watcher, subscription) => {
                watcher.run(subscription, shutdown_rx).await
            },
            Watcher::Polling(watcher) => watcher.run(shutdown_rx).await,
        }
    }
}

/// Read-only view of a session, cheap to clone into request handlers.
#[derive(Debug, Clone)]
pub struct WatchMonitor {
    account: String,
    state_rx: watch::Receiver<WatcherState>,
    stats: Arc<WatchStats>,
}

impl WatchMonitor {
    /// Returns the normalized account of the session.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Returns the current state.
    pub fn state(&self) -> WatcherState {
        *self.state_rx.borrow()
    }

    /// Returns a receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<WatcherState> {
        self.state_rx.clone()
    }

    pub fn stats(&self) -> &Arc<WatchStats> {
        &self.stats
    }

    pub fn report(&self) -> WatchReport {
        WatchReport::new(self.state(), self.account.clone(), &self.stats)
    }
}

/// Handle for a running supervisor. Dropping it ends the session.
pub struct SupervisorHandle {
    monitor: WatchMonitor,
    task: TaskHandle,
}

impl SupervisorHandle {
    pub fn account(&self) -> &str {
        self.monitor.account()
    }

    pub fn state(&self) -> WatcherState {
        self.monitor.state()
    }

    pub fn state_changes(&self) -> watch::Receiver<WatcherState> {
        self.monitor.state_changes()
    }

    pub fn stats(&self) -> &Arc<WatchStats> {
        self.monitor.stats()
    }

    pub fn report(&self) -> WatchReport {
        self.monitor.report()
    }

    pub fn monitor(&self) -> WatchMonitor {
        self.monitor.clone()
    }

    /// Signals the supervisor to stop.
    pub fn stop(&self) {
        self.task.stop();
    }

    /// Stops the supervisor and waits until it reports `Disconnected`.
    pub async fn shutdown(self) {
        self.task.shutdown().await;
    }
}

/// Drives the `Disconnected → Subscribing → Active | Polling` state machine
/// for one session.
pub struct Supervisor {
    provider: Arc<dyn ChainProvider>,
    store: Arc<CacheStore>,
    config: WatchConfig,
    stats: Arc<WatchStats>,
    state_tx: watch::Sender<WatcherState>,
}

impl Supervisor {
    /// Starts watching on behalf of `account`.
    ///
    /// Fails if the account is empty or the configuration is invalid.
    pub fn start(
        provider: Arc<dyn ChainProvider>,
        store: Arc<CacheStore>,
        config: WatchConfig,
        account: &str,
    ) -> Result<SupervisorHandle, WatchError> {
        let account = require_principal("account", account)?;
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(WatcherState::Disconnected);
        let stats = Arc::new(WatchStats::new());

        let supervisor = Self {
            provider,
            store,
            config,
            stats: Arc::clone(&stats),
            state_tx,
        };

        info!(account = %account, provider = supervisor.provider.name(), "Starting watch supervisor");
        let task = TaskHandle::spawn("watch-supervisor", move |shutdown_rx| {
            supervisor.run(shutdown_rx)
        });

        Ok(SupervisorHandle {
            monitor: WatchMonitor {
                account,
                state_rx,
                stats,
            },
            task,
        })
    }

    fn set_state(&self, state: WatcherState) {
        self.state_tx.send_replace(state);
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        if let Some(watcher) = self.select_watcher(&mut shutdown_rx).await {
            self.run_watchers(watcher, &mut shutdown_rx).await;
        }

        self.set_state(WatcherState::Disconnected);
        info!("Watch supervisor stopped");
    }

    /// Runs watchers until shutdown, re-subscribing when a stream ends.
    async fn run_watchers(&self, mut watcher: Watcher, shutdown_rx: &mut watch::Receiver<bool>) {
        loop {
            self.set_state(watcher.state());
            match watcher.run(shutdown_rx).await {
                WatcherExit::Shutdown => return,
                WatcherExit::StreamClosed => {
                    warn!("Event stream closed by provider, re-subscribing");
                    let pause = self.config.retry_base_delay();
                    tokio::select! {
                        biased;
                        _ = shutdown_requested(shutdown_rx) => return,
                        _ = tokio::time::sleep(pause) => {}
                    }
                },
            }

            match self.select_watcher(shutdown_rx).await {
                Some(next) => watcher = next,
                None => return,
            }
        }
    }

    /// Attempts subscription with retries; falls back to polling once the
    /// budget is spent. `None` if shutdown was requested meanwhile.
    async fn select_watcher(&self, shutdown_rx: &mut watch::Receiver<bool>) -> Option<Watcher> {
        let policy = self.config.retry_policy();
        let mut attempt: u32 = 0;

        loop {
            self.set_state(WatcherState::Subscribing);
            self.stats.record_subscribe_attempt();

            let result = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown_rx) => return None,
                result = EventWatcher::setup(self.provider.as_ref()) => result,
            };

            let error = match result {
                Ok(subscription) => {
                    self.stats.record_success();
                    info!(attempt = attempt, "Subscribed to ledger events");
                    let watcher = EventWatcher::new(Arc::clone(&self.store), Arc::clone(&self.stats));
                    return Some(Watcher::Subscription(watcher, subscription));
                },
                Err(e) => e,
            };
            self.stats.record_failure(error.to_string());

            match self.retry_delay(&error, attempt) {
                Some(delay) => {
                    warn!(
                        attempt = attempt,
                        error = %error,
                        "Subscription failed, retrying in {:?}", delay
                    );
                    attempt += 1;
                    tokio::select! {
                        biased;
                        _ = shutdown_requested(shutdown_rx) => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                },
                None => {
                    warn!(
                        attempts = attempt + 1,
                        error = %error,
                        "Subscription unavailable, switching to polling"
                    );
                    self.set_state(WatcherState::Polling);
                    let polling = tokio::select! {
                        biased;
                        _ = shutdown_requested(shutdown_rx) => return None,
                        polling = PollingWatcher::start(
                            Arc::clone(&self.provider),
                            Arc::clone(&self.store),
                            Arc::clone(&self.stats),
                            self.config.polling_interval(),
                        ) => polling,
                    };
                    return Some(Watcher::Polling(polling));
                },
            }
        }
    }

    fn retry_delay(&self, error: &ProviderError, attempt: u32) -> Option<std::time::Duration> {
        if !error.is_transient() {
            return None;
        }
        self.config.retry_policy().delay_for(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ledger_cache_core::{CoreError, LedgerEvent};
    use ledger_cache_store::StoreConfig;

    struct PollOnly;

    #[async_trait]
    impl ChainProvider for PollOnly {
        fn name(&self) -> &str {
            "poll-only"
        }

        async fn block_number(&self) -> Result<u64, ProviderError> {
            Ok(1)
        }

        async fn logs(&self, _from: u64, _to: u64) -> Result<Vec<LedgerEvent>, ProviderError> {
            Ok(Vec::new())
        }
    }

    fn store() -> Arc<CacheStore> {
        Arc::new(CacheStore::in_memory(StoreConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_empty_account_is_rejected() {
        let result = Supervisor::start(Arc::new(PollOnly), store(), WatchConfig::default(), "  ");

        assert!(matches!(
            result,
            Err(WatchError::InvalidSession(CoreError::EmptyPrincipal { role: "account" }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_subscription_polls_immediately() {
        let handle =
            Supervisor::start(Arc::new(PollOnly), store(), WatchConfig::default(), "0xAbC")
                .unwrap();
        assert_eq!(handle.account(), "0xabc");

        let mut states = handle.state_changes();
        states
            .wait_for(|state| *state == WatcherState::Polling)
            .await
            .unwrap();

        assert_eq!(handle.stats().subscribe_attempts(), 1);

        handle.shutdown().await;
        assert_eq!(*states.borrow(), WatcherState::Disconnected);
    }
}
