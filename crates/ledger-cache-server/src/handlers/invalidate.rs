//! Cache invalidation endpoint handlers.

use std::str::FromStr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use ledger_cache_core::CacheCategory;
use serde::Serialize;
use tracing::instrument;

use crate::error::AppError;
use crate::state::AppState;

/// Response para operaciones de invalidación.
#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    /// Número de entries invalidadas.
    pub invalidated: usize,
    /// Patrones aplicados (vacio para borrados exactos).
    pub patterns: Vec<String>,
    /// Mensaje descriptivo.
    pub message: String,
}

fn ok(invalidated: usize, patterns: Vec<String>, message: String) -> Response {
    (
        StatusCode::OK,
        Json(InvalidateResponse {
            invalidated,
            patterns,
            message,
        }),
    )
        .into_response()
}

/// DELETE /cache
/// Invalida toda la cache.
#[instrument(skip_all)]
pub async fn invalidate_all(State(state): State<AppState>) -> Response {
    let count = state.store().clear().await;

    tracing::info!(count = count, "All cache entries invalidated");

    ok(
        count,
        Vec::new(),
        format!("Invalidated all {} cache entries", count),
    )
}

/// DELETE /cache/principals/{address}
/// Invalida toda entry que mencione la direccion.
#[instrument(skip_all, fields(address = %address))]
pub async fn invalidate_principal(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Response, AppError> {
    if address.trim().is_empty() {
        return Err(AppError::BadRequest("Address cannot be empty".to_string()));
    }

    let result = state.store().invalidate_principal(&address).await;

    Ok(ok(
        result.count,
        result.patterns,
        format!(
            "Invalidated {} cache entries for '{}'",
            result.count,
            address.trim().to_lowercase()
        ),
    ))
}

/// DELETE /cache/categories/{category}
/// Invalida todas las entries de una categoria.
#[instrument(skip_all, fields(category = %category))]
pub async fn invalidate_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Response, AppError> {
    let parsed =
        CacheCategory::from_str(&category).map_err(|e| AppError::BadRequest(e.to_string()))?;

    let result = state.store().invalidate_category(parsed).await;

    Ok(ok(
        result.count,
        result.patterns,
        format!(
            "Invalidated {} cache entries in category '{}'",
            result.count, parsed
        ),
    ))
}

/// DELETE /cache/keys/{key}
/// Borra una entry exacta. Borrar una key ausente no es un error.
#[instrument(skip_all, fields(key = %key))]
pub async fn invalidate_key(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let removed = state.store().delete(&key).await;

    tracing::info!(key = %key, removed = removed, "Cache entry invalidated");

    ok(
        usize::from(removed),
        Vec::new(),
        format!("Invalidated cache entry '{}'", key),
    )
}
