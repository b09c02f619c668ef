//! Ledger Cache Core - Domain types
//!
//! This crate provides the foundational types shared by the cache store,
//! the chain watchers and the diagnostics server:
//!
//! - [`CacheKey`]: deterministic, namespaced keys with lowercased principals
//! - [`TtlPolicy`]: per-category lifetimes
//! - [`LedgerEvent`]: the upstream ledger events that trigger invalidation

pub mod error;
pub mod event;
pub mod keys;
pub mod ttl;

pub use error::CoreError;
pub use event::LedgerEvent;
pub use keys::{CacheCategory, CacheKey, normalize_address, require_principal};
pub use ttl::{TtlPolicy, duration_ms, millis};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
