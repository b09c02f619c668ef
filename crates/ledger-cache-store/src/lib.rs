//! Ledger Cache Store
//!
//! Client-side cache for chain reads:
//!
//! - [`CacheStore`]: TTL entries, bounded size with oldest-first eviction,
//!   write-through snapshot persistence and a background sweep
//! - substring and category invalidation, including the ledger event table
//! - [`RequestCoordinator`]: one outstanding fetch per key, results cached
//!   under the category TTL
//! - [`Debouncer`]: collapses bursts of refetch triggers

pub mod config;
pub mod coordinator;
pub mod debounce;
pub mod error;
pub mod invalidation;
pub mod metrics;
pub mod persistence;
pub mod store;
pub mod sweep;
pub mod task;

pub use config::StoreConfig;
pub use coordinator::RequestCoordinator;
pub use debounce::{DEFAULT_DEBOUNCE, Debouncer};
pub use error::{CoordinatorError, StorageError, StoreError};
pub use invalidation::{FHE_CATEGORIES, InvalidationResult};
pub use metrics::{CacheMetrics, EvictionReason, register_cache_metrics};
pub use persistence::{JsonFileStorage, MemoryStorage, PersistedEntry, Snapshot, SnapshotStorage};
pub use store::{CacheStats, CacheStore, EntryStats};
pub use task::{TaskHandle, shutdown_requested};
