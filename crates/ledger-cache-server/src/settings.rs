//! Configuracion del daemon.
//!
//! Se carga con el crate `config`: un archivo TOML opcional
//! (`LEDGER_CACHE_CONFIG`, por defecto `ledger-cache.toml`) y encima
//! variables de entorno con prefijo `LEDGER_CACHE__`, por ejemplo
//! `LEDGER_CACHE__CHAIN__ACCOUNT=0xabc` o `LEDGER_CACHE__SERVER__PORT=9000`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use ledger_cache_core::{CacheCategory, TtlPolicy, millis};
use ledger_cache_store::StoreConfig;
use ledger_cache_watch::{RpcConfig, WatchConfig};
use serde::Deserialize;

/// Variable con la ruta del archivo de configuracion.
pub const CONFIG_PATH_ENV: &str = "LEDGER_CACHE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "ledger-cache.toml";
const ENV_PREFIX: &str = "LEDGER_CACHE";

/// Contrato del ledger usado si no se configura otro.
pub const DEFAULT_CONTRACT: &str = "0xF6e6AE366316b30699e275A8bA0627AAb967a4Da";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub chain: ChainSettings,
    pub cache: CacheSettings,
    pub watch: WatchSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8899,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    pub http_url: String,
    pub ws_url: Option<String>,
    pub contract: String,
    /// Cuenta de la sesion; sin ella no se arranca el supervisor.
    pub account: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            http_url: "http://127.0.0.1:8545".to_string(),
            ws_url: None,
            contract: DEFAULT_CONTRACT.to_string(),
            account: None,
            request_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub snapshot_path: PathBuf,
    pub default_ttl_ms: u64,
    pub max_size: usize,
    pub cleanup_interval_ms: u64,
    /// TTL por categoria en ms, con el nombre de la categoria como clave
    /// (`balance`, `total-balance`, ...).
    pub ttl: BTreeMap<String, u64>,
    pub debounce_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let store = StoreConfig::default();
        Self {
            snapshot_path: PathBuf::from("ledger-cache.json"),
            default_ttl_ms: millis(store.default_ttl()),
            max_size: store.max_size(),
            cleanup_interval_ms: millis(store.cleanup_interval()),
            ttl: BTreeMap::new(),
            debounce_ms: millis(ledger_cache_store::DEFAULT_DEBOUNCE),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub polling_interval_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        let watch = WatchConfig::default();
        Self {
            max_retries: watch.max_retries(),
            retry_base_delay_ms: millis(watch.retry_base_delay()),
            polling_interval_ms: millis(watch.polling_interval()),
        }
    }
}

impl Settings {
    /// Carga la configuracion desde archivo y entorno.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Carga la configuracion usando `path` como archivo (opcional).
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| ConfigError::Message(format!("invalid listen address: {}", e)))
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::default()
            .with_default_ttl(Duration::from_millis(self.cache.default_ttl_ms))
            .with_max_size(self.cache.max_size)
            .with_cleanup_interval(Duration::from_millis(self.cache.cleanup_interval_ms))
    }

    /// Politica de TTL con los overrides por categoria aplicados.
    pub fn ttl_policy(&self) -> Result<TtlPolicy, ConfigError> {
        self.cache
            .ttl
            .iter()
            .try_fold(TtlPolicy::default(), |policy, (name, ms)| {
                let category = CacheCategory::from_str(name)
                    .map_err(|e| ConfigError::Message(e.to_string()))?;
                Ok(policy.with_ttl(category, Duration::from_millis(*ms)))
            })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.cache.debounce_ms)
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig::default()
            .with_max_retries(self.watch.max_retries)
            .with_retry_base_delay(Duration::from_millis(self.watch.retry_base_delay_ms))
            .with_polling_interval(Duration::from_millis(self.watch.polling_interval_ms))
    }

    pub fn rpc_config(&self) -> RpcConfig {
        let config = RpcConfig::new(&self.chain.http_url, &self.chain.contract)
            .with_request_timeout(Duration::from_millis(self.chain.request_timeout_ms));
        match &self.chain.ws_url {
            Some(ws_url) => config.with_ws_url(ws_url),
            None => config,
        }
    }
}
