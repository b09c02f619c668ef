//! Coordinated chain reads.
//!
//! Each read goes through the [`RequestCoordinator`](ledger_cache_store::RequestCoordinator):
//! concurrent requests for the same key share one RPC call, and the result
//! is cached under the TTL of its category.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use ledger_cache_core::{CacheKey, millis};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ReadResponse<T> {
    pub key: String,
    pub value: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub key: String,
    pub invalidated: bool,
    pub delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct BalancePath {
    pub token: String,
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct AllowancePath {
    pub token: String,
    pub user: String,
    pub spender: String,
}

/// GET /contracts/{address}/exists
#[instrument(skip_all, fields(address = %address))]
pub async fn contract_exists(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ReadResponse<bool>>, AppError> {
    let key = CacheKey::contract_exists(&address);
    let reads = state.reads();

    let value = state
        .coordinator()
        .fetch(&key, move || async move {
            reads
                .contract_exists(&address)
                .await
                .map_err(anyhow::Error::from)
        })
        .await?;

    Ok(Json(ReadResponse {
        key: key.to_string(),
        value,
    }))
}

/// GET /tokens/{token}/balances/{user}
#[instrument(skip_all, fields(token = %path.token, user = %path.user))]
pub async fn balance(
    State(state): State<AppState>,
    Path(path): Path<BalancePath>,
) -> Result<Json<ReadResponse<String>>, AppError> {
    let key = CacheKey::balance(&path.user, &path.token, false);
    let value = fetch_balance(&state, &key, path).await?;

    Ok(Json(ReadResponse {
        key: key.to_string(),
        value,
    }))
}

async fn fetch_balance(
    state: &AppState,
    key: &CacheKey,
    path: BalancePath,
) -> Result<String, ledger_cache_store::CoordinatorError> {
    let reads = state.reads();
    state
        .coordinator()
        .fetch(key, move || async move {
            reads
                .balance_of(&path.token, &path.user)
                .await
                .map_err(anyhow::Error::from)
        })
        .await
}

/// POST /tokens/{token}/balances/{user}/refresh
/// Invalida el balance y agenda una relectura con debounce; rafagas de
/// refresh sobre la misma key producen una sola lectura.
#[instrument(skip_all, fields(token = %path.token, user = %path.user))]
pub async fn refresh_balance(
    State(state): State<AppState>,
    Path(path): Path<BalancePath>,
) -> Response {
    let key = CacheKey::balance(&path.user, &path.token, false);
    let invalidated = state.store().delete(&key.to_string()).await;

    let refresher = state.clone();
    let refresh_key = key.clone();
    state.schedule_refresh(&key.to_string(), move || async move {
        if let Err(e) = fetch_balance(&refresher, &refresh_key, path).await {
            warn!(key = %refresh_key, error = %e, "Debounced balance refresh failed");
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(RefreshResponse {
            key: key.to_string(),
            invalidated,
            delay_ms: millis(state.debounce()),
        }),
    )
        .into_response()
}

/// GET /tokens/{token}/allowances/{user}/{spender}
#[instrument(skip_all, fields(token = %path.token, user = %path.user, spender = %path.spender))]
pub async fn allowance(
    State(state): State<AppState>,
    Path(path): Path<AllowancePath>,
) -> Result<Json<ReadResponse<String>>, AppError> {
    let key = CacheKey::allowance(&path.user, &path.token, &path.spender);
    let reads = state.reads();

    let value = state
        .coordinator()
        .fetch(&key, move || async move {
            reads
                .allowance(&path.token, &path.user, &path.spender)
                .await
                .map_err(anyhow::Error::from)
        })
        .await?;

    Ok(Json(ReadResponse {
        key: key.to_string(),
        value,
    }))
}
