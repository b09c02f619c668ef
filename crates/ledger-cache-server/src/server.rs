use std::future::Future;
use std::net::SocketAddr;

use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, warn};

use crate::handlers::{
    health::health_check,
    invalidate::{invalidate_all, invalidate_category, invalidate_key, invalidate_principal},
    metrics::metrics_handler,
    reads::{allowance, balance, contract_exists, refresh_balance},
    stats::cache_stats,
    watcher::watcher_status,
};
use crate::metrics::http::http_metrics_middleware;
use crate::middleware::{MakeRequestUuidV7, REQUEST_ID_HEADER, request_span};
use crate::state::AppState;

/// Creates a router with the given application state and metrics handle.
pub fn create_router(state: AppState, prometheus_handle: PrometheusHandle) -> Router {
    let middleware_stack = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            REQUEST_ID_HEADER.clone(),
            MakeRequestUuidV7,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER.clone()));

    // Router for metrics endpoint (different state)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    let app_router = Router::new()
        .route("/health", get(health_check))
        // Cache routes
        .route("/cache", delete(invalidate_all))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/principals/{address}", delete(invalidate_principal))
        .route("/cache/categories/{category}", delete(invalidate_category))
        .route("/cache/keys/{key}", delete(invalidate_key))
        // Watcher
        .route("/watcher", get(watcher_status))
        // Coordinated reads
        .route("/contracts/{address}/exists", get(contract_exists))
        .route("/tokens/{token}/balances/{user}", get(balance))
        .route(
            "/tokens/{token}/balances/{user}/refresh",
            post(refresh_balance),
        )
        .route(
            "/tokens/{token}/allowances/{user}/{spender}",
            get(allowance),
        )
        .with_state(state);

    Router::new()
        .merge(app_router)
        .merge(metrics_router)
        .layer(middleware::from_fn(http_metrics_middleware))
        .layer(middleware_stack)
}

/// Serves `app` on `addr` until `shutdown` resolves.
pub async fn run_server<F>(addr: SocketAddr, app: Router, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
