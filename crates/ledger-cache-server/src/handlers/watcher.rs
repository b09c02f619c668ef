//! Watcher status handler.

use axum::{Json, extract::State};
use ledger_cache_watch::WatchReport;
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

/// GET /watcher
/// Estado del supervisor de la sesion configurada.
#[instrument(skip_all)]
pub async fn watcher_status(State(state): State<AppState>) -> Result<Json<WatchReport>, AppError> {
    state
        .watcher()
        .map(|watcher| Json(watcher.report()))
        .ok_or_else(|| AppError::Unavailable("No watch session is configured".to_string()))
}
