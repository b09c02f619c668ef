//! Ledger Cache Server - diagnostics daemon
//!
//! Wires the cache store, the chain watchers and the coordinated reads
//! behind an Axum router: cache stats, invalidation, watcher status and
//! Prometheus metrics.

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod reads;
pub mod server;
pub mod settings;
pub mod state;

pub use error::AppError;
pub use handlers::health::HealthResponse;
pub use reads::ChainReads;
pub use server::{create_router, run_server, shutdown_signal};
pub use settings::Settings;
pub use state::AppState;
