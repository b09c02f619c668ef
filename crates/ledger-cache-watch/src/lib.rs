//! Ledger Cache Watch
//!
//! Keeps a [`CacheStore`](ledger_cache_store::CacheStore) in sync with the
//! ledger contract by invalidating entries touched by on-chain events.
//!
//! - [`EventWatcher`]: push invalidation from a live subscription
//! - [`PollingWatcher`]: block-range scans on a fixed interval
//! - [`Supervisor`]: subscription with exponential retries, polling once
//!   the retry budget is spent
//! - [`JsonRpcProvider`]: [`ChainProvider`] over HTTP and WebSocket JSON-RPC

pub mod config;
pub mod error;
pub mod polling;
pub mod provider;
pub mod retry;
pub mod rpc;
pub mod state;
pub mod subscription;
pub mod supervisor;

pub use config::WatchConfig;
pub use error::{ProviderError, WatchError};
pub use polling::{PollOutcome, PollingWatcher};
pub use provider::{ChainProvider, Subscription};
pub use retry::RetryPolicy;
pub use rpc::{JsonRpcProvider, RpcConfig, decode_log, event_topics};
pub use state::{WatchReport, WatchStats, WatcherState};
pub use subscription::{EventWatcher, WatcherExit};
pub use supervisor::{Supervisor, SupervisorHandle, WatchMonitor, Watcher};
