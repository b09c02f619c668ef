//! Cache statistics handler.

use axum::{Json, extract::State};
use ledger_cache_store::CacheStats;
use tracing::instrument;

use crate::state::AppState;

/// GET /cache/stats
/// Entries vivas con su edad y TTL, mas contadores de hits y misses.
#[instrument(skip_all)]
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.store().stats())
}
