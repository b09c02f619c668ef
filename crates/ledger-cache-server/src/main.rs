//! Ledger Cache diagnostics daemon.

use std::sync::Arc;

use anyhow::Context;
use ledger_cache_server::{AppState, Settings, create_router, metrics, run_server, shutdown_signal};
use ledger_cache_store::{CacheStore, JsonFileStorage};
use ledger_cache_watch::{JsonRpcProvider, Supervisor};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load().context("failed to load settings")?;
    let addr = settings.addr()?;
    let ttl = settings.ttl_policy()?;

    tracing::info!(
        "Starting Ledger Cache Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("RPC endpoint: {}", settings.chain.http_url);
    tracing::info!("Ledger contract: {}", settings.chain.contract);
    tracing::info!("Snapshot: {}", settings.cache.snapshot_path.display());

    let prometheus = metrics::init_metrics().context("failed to install metrics recorder")?;

    let storage = Arc::new(JsonFileStorage::new(&settings.cache.snapshot_path));
    let store = Arc::new(
        CacheStore::open(settings.store_config(), storage)
            .await
            .context("failed to open cache store")?,
    );
    let sweep = store.start_sweep();

    let provider = Arc::new(
        JsonRpcProvider::new(settings.rpc_config()).context("failed to build RPC provider")?,
    );

    let mut state = AppState::new(Arc::clone(&store), ttl, provider.clone())
        .with_debounce(settings.debounce());

    let supervisor = match settings.chain.account.as_deref() {
        Some(account) => {
            let handle = Supervisor::start(
                provider,
                Arc::clone(&store),
                settings.watch_config(),
                account,
            )
            .context("failed to start watch supervisor")?;
            state = state.with_watcher(handle.monitor());
            Some(handle)
        },
        None => {
            tracing::warn!("No chain.account configured, cache will not follow ledger events");
            None
        },
    };

    let app = create_router(state, prometheus);
    run_server(addr, app, shutdown_signal()).await?;

    if let Some(supervisor) = supervisor {
        supervisor.shutdown().await;
    }
    sweep.shutdown().await;
    tracing::info!(entries = store.len(), "Ledger Cache Server stopped");

    Ok(())
}
