//! Metrics module for the diagnostics daemon.

pub mod http;
pub mod setup;

pub use setup::init_metrics;
