//! Polling fallback: scan new blocks for ledger events on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use ledger_cache_store::{CacheStore, shutdown_requested};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::error::ProviderError;
use crate::provider::ChainProvider;
use crate::state::WatchStats;
use crate::subscription::WatcherExit;

/// Outcome of one polling tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// First successful height read; nothing scanned.
    Seeded { block: u64 },
    /// No new blocks since the last scan.
    Idle { block: u64 },
    /// Scanned `from..=to` and applied the events found.
    Scanned {
        from: u64,
        to: u64,
        events: usize,
        invalidated: usize,
    },
}

/// Scans block ranges for ledger events and invalidates the cache.
pub struct PollingWatcher {
    provider: Arc<dyn ChainProvider>,
    store: Arc<CacheStore>,
    stats: Arc<WatchStats>,
    interval: Duration,
    last_processed_block: Option<u64>,
}

impl PollingWatcher {
    pub fn new(
        provider: Arc<dyn ChainProvider>,
        store: Arc<CacheStore>,
        stats: Arc<WatchStats>,
        interval: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            stats,
            interval,
            last_processed_block: None,
        }
    }

    /// Creates the watcher and seeds the last processed block from the
    /// current height. If that read fails the first successful tick seeds it.
    pub async fn start(
        provider: Arc<dyn ChainProvider>,
        store: Arc<CacheStore>,
        stats: Arc<WatchStats>,
        interval: Duration,
    ) -> Self {
        let mut watcher = Self::new(provider, store, stats, interval);
        match watcher.provider.block_number().await {
            Ok(block) => watcher.seed(block),
            Err(e) => {
                watcher.stats.record_failure(e.to_string());
                warn!(
                    provider = watcher.provider.name(),
                    error = %e,
                    "Failed to read start block, seeding on first tick"
                );
            },
        }
        watcher
    }

    fn seed(&mut self, block: u64) {
        self.last_processed_block = Some(block);
        self.stats.set_last_processed_block(block);
        info!(block = block, "Polling watcher seeded");
    }

    pub fn last_processed_block(&self) -> Option<u64> {
        self.last_processed_block
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one tick. On error the last processed block is left unchanged
    /// so the same range is scanned again next time.
    pub async fn poll_once(&mut self) -> Result<PollOutcome, ProviderError> {
        let current = self.provider.block_number().await?;

        let Some(last) = self.last_processed_block else {
            self.seed(current);
            return Ok(PollOutcome::Seeded { block: current });
        };

        if current <= last {
            return Ok(PollOutcome::Idle { block: current });
        }

        let from = last + 1;
        let events = self.provider.logs(from, current).await?;

        let mut invalidated = 0;
        for event in &events {
            let result = self.store.invalidate_for_event(event).await;
            self.stats.record_event(result.count);
            invalidated += result.count;
        }

        self.last_processed_block = Some(current);
        self.stats.set_last_processed_block(current);

        Ok(PollOutcome::Scanned {
            from,
            to: current,
            events: events.len(),
            invalidated,
        })
    }

    /// Polls every interval until shutdown.
    pub async fn run(mut self, shutdown_rx: &mut watch::Receiver<bool>) -> WatcherExit {
        let mut timer = interval_at(Instant::now() + self.interval, self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            provider = self.provider.name(),
            "Starting polling watcher with interval {:?}", self.interval
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(shutdown_rx) => {
                    info!("Polling watcher shutting down");
                    return WatcherExit::Shutdown;
                }
                _ = timer.tick() => {
                    // Un scan en curso no debe invalidar nada tras el shutdown.
                    let result = tokio::select! {
                        biased;
                        _ = shutdown_requested(shutdown_rx) => {
                            info!("Polling watcher shutting down during scan");
                            return WatcherExit::Shutdown;
                        }
                        result = self.poll_once() => result,
                    };
                    match result {
                        Ok(outcome) => {
                            self.stats.record_success();
                            debug!(?outcome, "Polling tick completed");
                        },
                        Err(e) => {
                            self.stats.record_failure(e.to_string());
                            warn!(
                                error = %e,
                                last_processed_block = ?self.last_processed_block,
                                "Polling tick failed"
                            );
                        },
                    }
                }
            }
        }
    }
}
