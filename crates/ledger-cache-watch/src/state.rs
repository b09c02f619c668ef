//! Watcher state tracking.

use std::fmt;

use parking_lot::RwLock;
use serde::Serialize;

/// Supervisor state for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatcherState {
    Disconnected,
    Subscribing,
    Active,
    Polling,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WatcherState::Disconnected => "disconnected",
            WatcherState::Subscribing => "subscribing",
            WatcherState::Active => "active",
            WatcherState::Polling => "polling",
        };
        f.write_str(name)
    }
}

/// Counters shared by the watchers of one session.
#[derive(Debug, Default)]
pub struct WatchStats {
    /// Last block fully scanned by the polling watcher.
    last_processed_block: RwLock<Option<u64>>,
    /// Ledger events applied to the cache.
    events_applied: RwLock<u64>,
    /// Cache entries removed because of those events.
    entries_invalidated: RwLock<u64>,
    /// Subscription setup attempts so far.
    subscribe_attempts: RwLock<u32>,
    /// Consecutive failures (subscription setup or polling ticks).
    failure_count: RwLock<u32>,
    /// The last error message, if any.
    last_error: RwLock<Option<String>>,
}

impl WatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an applied event and the entries it removed.
    pub fn record_event(&self, invalidated: usize) {
        *self.events_applied.write() += 1;
        *self.entries_invalidated.write() += invalidated as u64;
    }

    pub fn record_subscribe_attempt(&self) {
        *self.subscribe_attempts.write() += 1;
    }

    /// Records a successful operation, clearing the failure streak.
    pub fn record_success(&self) {
        let mut last_error = self.last_error.write();
        let mut failure_count = self.failure_count.write();

        *last_error = None;
        *failure_count = 0;
    }

    /// Records a failed operation.
    pub fn record_failure(&self, error: impl Into<String>) {
        let mut last_error = self.last_error.write();
        let mut failure_count = self.failure_count.write();

        *last_error = Some(error.into());
        *failure_count += 1;
    }

    pub fn set_last_processed_block(&self, block: u64) {
        *self.last_processed_block.write() = Some(block);
    }

    pub fn last_processed_block(&self) -> Option<u64> {
        *self.last_processed_block.read()
    }

    pub fn events_applied(&self) -> u64 {
        *self.events_applied.read()
    }

    pub fn entries_invalidated(&self) -> u64 {
        *self.entries_invalidated.read()
    }

    pub fn subscribe_attempts(&self) -> u32 {
        *self.subscribe_attempts.read()
    }

    pub fn failure_count(&self) -> u32 {
        *self.failure_count.read()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }
}

/// Serializable view of a watch session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchReport {
    pub state: WatcherState,
    pub account: String,
    pub last_processed_block: Option<u64>,
    pub events_applied: u64,
    pub entries_invalidated: u64,
    pub subscribe_attempts: u32,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl WatchReport {
    pub fn new(state: WatcherState, account: impl Into<String>, stats: &WatchStats) -> Self {
        Self {
            state,
            account: account.into(),
            last_processed_block: stats.last_processed_block(),
            events_applied: stats.events_applied(),
            entries_invalidated: stats.entries_invalidated(),
            subscribe_attempts: stats.subscribe_attempts(),
            consecutive_failures: stats.failure_count(),
            last_error: stats.last_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_then_success_resets_streak() {
        let stats = WatchStats::new();

        stats.record_failure("connection refused");
        stats.record_failure("connection refused");
        assert_eq!(stats.failure_count(), 2);
        assert_eq!(stats.last_error().as_deref(), Some("connection refused"));

        stats.record_success();
        assert_eq!(stats.failure_count(), 0);
        assert!(stats.last_error().is_none());
    }

    #[test]
    fn test_report_serialization() {
        let stats = WatchStats::new();
        stats.record_event(3);
        stats.set_last_processed_block(120);

        let report = WatchReport::new(WatcherState::Polling, "0xabc", &stats);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["state"], "polling");
        assert_eq!(json["lastProcessedBlock"], 120);
        assert_eq!(json["eventsApplied"], 1);
        assert_eq!(json["entriesInvalidated"], 3);
    }
}
