//! Store con TTL, capacidad acotada y persistencia write-through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ledger_cache_core::{duration_ms, millis};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::metrics::{CacheMetrics, EvictionReason};
use crate::persistence::{MemoryStorage, PersistedEntry, Snapshot, SnapshotStorage};

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Value,
    inserted_at: Instant,
    /// Momento de insercion en reloj de pared, unix ms. Solo se usa al persistir.
    timestamp: i64,
    ttl: Duration,
    seq: u64,
}

impl CacheEntry {
    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.age(now) > self.ttl
    }

    fn to_persisted(&self) -> PersistedEntry {
        PersistedEntry {
            data: self.data.clone(),
            timestamp: self.timestamp,
            ttl: millis(self.ttl),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
}

impl Inner {
    fn insert(&mut self, key: String, data: Value, ttl: Duration, inserted_at: Instant, timestamp: i64) {
        self.next_seq += 1;
        let entry = CacheEntry {
            data,
            inserted_at,
            timestamp,
            ttl,
            seq: self.next_seq,
        };
        self.entries.insert(key, entry);
    }

    /// Elimina las `count` entries mas antiguas por orden de insercion.
    fn evict_oldest(&mut self, count: usize) -> usize {
        let mut ranked: Vec<(Instant, u64, String)> = self
            .entries
            .iter()
            .map(|(key, entry)| (entry.inserted_at, entry.seq, key.clone()))
            .collect();
        ranked.sort_unstable();

        let mut evicted = 0;
        for (_, _, key) in ranked.into_iter().take(count) {
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    fn remove_where(&mut self, mut predicate: impl FnMut(&str, &CacheEntry) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| !predicate(key.as_str(), entry));
        before - self.entries.len()
    }

    fn snapshot(&self) -> Snapshot {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.to_persisted()))
            .collect()
    }
}

enum Lookup {
    Hit(Value),
    Miss,
    Expired,
}

/// Estadisticas del store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Entries vivas.
    pub size: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    /// Proporcion de hits sobre lecturas, en [0, 1].
    pub hit_rate: f64,
    pub entries: Vec<EntryStats>,
}

/// Edad y TTL de una entry, en milisegundos al serializar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryStats {
    pub key: String,
    #[serde(with = "duration_ms")]
    pub age: Duration,
    #[serde(with = "duration_ms")]
    pub ttl: Duration,
}

/// Cache de lecturas de la cadena.
///
/// Todas las mutaciones se completan en memoria antes de la primera
/// suspension; la escritura del snapshot ocurre despues y sus fallos solo se
/// registran.
///
/// # Examples
///
/// ```no_run
/// use ledger_cache_store::{CacheStore, StoreConfig};
/// use serde_json::json;
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = CacheStore::in_memory(StoreConfig::default()).unwrap();
///
/// store.set("token-support:0xabc", json!(true), None).await;
/// assert_eq!(store.get("token-support:0xabc").await, Some(json!(true)));
/// # }
/// ```
pub struct CacheStore {
    inner: Mutex<Inner>,
    config: StoreConfig,
    storage: Arc<dyn SnapshotStorage>,
    /// Serializa las escrituras del snapshot; la ultima lleva el estado mas reciente.
    persist_lock: tokio::sync::Mutex<()>,
    metrics: CacheMetrics,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("config", &self.config)
            .field("storage", &self.storage.name())
            .field("len", &self.len())
            .finish()
    }
}

impl CacheStore {
    fn build(config: StoreConfig, storage: Arc<dyn SnapshotStorage>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            config,
            storage,
            persist_lock: tokio::sync::Mutex::new(()),
            metrics: CacheMetrics::new(),
        }
    }

    /// Abre el store y restaura el snapshot persistido.
    ///
    /// Un snapshot ilegible no es fatal: se registra y el store arranca vacio.
    pub async fn open(
        config: StoreConfig,
        storage: Arc<dyn SnapshotStorage>,
    ) -> Result<Self, StoreError> {
        config.validate()?;
        let store = Self::build(config, storage);

        match store.storage.load().await {
            Ok(Some(snapshot)) => {
                let total = snapshot.len();
                let restored = store.restore(snapshot);
                info!(
                    storage = store.storage.name(),
                    restored = restored,
                    discarded = total - restored,
                    "Cache snapshot restored"
                );
            },
            Ok(None) => {
                debug!(storage = store.storage.name(), "No cache snapshot found");
            },
            Err(e) => {
                warn!(
                    storage = store.storage.name(),
                    error = %e,
                    "Failed to load cache snapshot, starting empty"
                );
            },
        }

        Ok(store)
    }

    /// Crea un store vacio sobre [`MemoryStorage`].
    pub fn in_memory(config: StoreConfig) -> Result<Self, StoreError> {
        config.validate()?;
        Ok(Self::build(config, Arc::new(MemoryStorage::new())))
    }

    /// Carga las entries vivas del snapshot, conservando como maximo las `max_size` mas recientes.
    fn restore(&self, snapshot: Snapshot) -> usize {
        let now_ms = Utc::now().timestamp_millis();
        let now = Instant::now();

        let mut live: Vec<(String, PersistedEntry, u64)> = snapshot
            .into_iter()
            .filter_map(|(key, entry)| {
                let age_ms = u64::try_from(now_ms.saturating_sub(entry.timestamp)).unwrap_or(0);
                (age_ms < entry.ttl).then_some((key, entry, age_ms))
            })
            .collect();

        live.sort_by_key(|(_, entry, _)| entry.timestamp);
        let skip = live.len().saturating_sub(self.config.max_size());

        let mut inner = self.inner.lock();
        for (key, entry, age_ms) in live.into_iter().skip(skip) {
            let inserted_at = now
                .checked_sub(Duration::from_millis(age_ms))
                .unwrap_or(now);
            inner.insert(
                key,
                entry.data,
                Duration::from_millis(entry.ttl),
                inserted_at,
                entry.timestamp,
            );
        }
        self.metrics.update_entry_count(inner.entries.len());
        inner.entries.len()
    }

    /// Guarda `data` bajo `key`; `ttl` por defecto es `default_ttl`.
    ///
    /// Si el store esta lleno desaloja primero el 10% mas antiguo.
    pub async fn set(&self, key: &str, data: Value, ttl: Option<Duration>) {
        let start = std::time::Instant::now();
        let ttl = ttl.unwrap_or(self.config.default_ttl());

        let (evicted, size) = {
            let mut inner = self.inner.lock();
            let evicted = if inner.entries.len() >= self.config.max_size() {
                inner.evict_oldest(self.config.eviction_batch())
            } else {
                0
            };
            inner.insert(
                key.to_string(),
                data,
                ttl,
                Instant::now(),
                Utc::now().timestamp_millis(),
            );
            (evicted, inner.entries.len())
        };

        if evicted > 0 {
            self.metrics
                .record_evictions(EvictionReason::Capacity, evicted);
            debug!(evicted = evicted, size = size, "Evicted oldest cache entries");
        }
        self.metrics.update_entry_count(size);

        self.persist().await;
        self.metrics
            .record_operation_duration("set", start.elapsed());
    }

    /// Serializa `value` y lo guarda.
    pub async fn set_as<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), serde_json::Error> {
        let data = serde_json::to_value(value)?;
        self.set(key, data, ttl).await;
        Ok(())
    }

    /// Devuelve el valor si existe y no ha expirado.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let start = std::time::Instant::now();
        let now = Instant::now();

        let lookup = {
            let mut inner = self.inner.lock();
            let found = inner
                .entries
                .get(key)
                .map(|entry| (!entry.is_expired(now)).then(|| entry.data.clone()));
            match found {
                None => Lookup::Miss,
                Some(Some(data)) => Lookup::Hit(data),
                Some(None) => {
                    inner.entries.remove(key);
                    Lookup::Expired
                },
            }
        };

        let result = match lookup {
            Lookup::Hit(data) => {
                self.metrics.record_hit();
                Some(data)
            },
            Lookup::Miss => {
                self.metrics.record_miss();
                None
            },
            Lookup::Expired => {
                self.metrics.record_miss();
                self.metrics.record_evictions(EvictionReason::Ttl, 1);
                debug!(key = %key, "Cache entry expired");
                self.persist().await;
                None
            },
        };

        self.metrics
            .record_operation_duration("get", start.elapsed());
        result
    }

    /// Lee y deserializa el valor guardado bajo `key`.
    pub async fn get_as<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, serde_json::Error> {
        self.get(key).await.map(serde_json::from_value).transpose()
    }

    /// `true` si `get(key)` devolveria un valor.
    pub async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Borra una entry. Devuelve `false` si no existia.
    pub async fn delete(&self, key: &str) -> bool {
        let removed = {
            let mut inner = self.inner.lock();
            let removed = inner.entries.remove(key).is_some();
            self.metrics.update_entry_count(inner.entries.len());
            removed
        };

        if removed {
            self.metrics.record_evictions(EvictionReason::Manual, 1);
            self.persist().await;
        }
        removed
    }

    /// Borra todas las entries y persiste un snapshot vacio.
    pub async fn clear(&self) -> usize {
        let count = {
            let mut inner = self.inner.lock();
            let count = inner.entries.len();
            inner.entries.clear();
            count
        };

        self.metrics.record_evictions(EvictionReason::Manual, count);
        self.metrics.update_entry_count(0);
        info!(count = count, "Cache cleared");

        self.persist().await;
        count
    }

    /// Borra todas las keys que contienen `pattern` como substring.
    ///
    /// Un patron vacio coincide con todas las keys.
    pub async fn clear_pattern(&self, pattern: &str) -> usize {
        let count = self
            .remove_where(|key| key.contains(pattern), EvictionReason::Pattern)
            .await;
        debug!(pattern = %pattern, count = count, "Cache pattern cleared");
        count
    }

    /// Borra todas las keys que cumplen `predicate` con una sola escritura del snapshot.
    pub(crate) async fn remove_where(
        &self,
        predicate: impl Fn(&str) -> bool,
        reason: EvictionReason,
    ) -> usize {
        let count = {
            let mut inner = self.inner.lock();
            let count = inner.remove_where(|key, _| predicate(key));
            self.metrics.update_entry_count(inner.entries.len());
            count
        };

        if count > 0 {
            self.metrics.record_evictions(reason, count);
            self.persist().await;
        }
        count
    }

    /// Elimina todas las entries expiradas. Lo invoca el barrido periodico.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let count = {
            let mut inner = self.inner.lock();
            let count = inner.remove_where(|_, entry| entry.is_expired(now));
            self.metrics.update_entry_count(inner.entries.len());
            count
        };

        if count > 0 {
            self.metrics.record_evictions(EvictionReason::Ttl, count);
            debug!(count = count, "Expired cache entries purged");
            self.persist().await;
        }
        count
    }

    /// Snapshot de estadisticas. Las entries expiradas no se listan.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let inner = self.inner.lock();

        let mut entries: Vec<EntryStats> = inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| EntryStats {
                key: key.clone(),
                age: entry.age(now),
                ttl: entry.ttl,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            size: entries.len(),
            max_size: self.config.max_size(),
            hits: self.metrics.hits(),
            misses: self.metrics.misses(),
            hit_rate: self.metrics.hit_rate(),
            entries,
        }
    }

    /// Numero de entries en memoria, incluidas las expiradas aun no barridas.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys presentes en memoria, ordenadas.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.inner.lock().snapshot();

        if let Err(e) = self.storage.save(snapshot).await {
            self.metrics.record_persist_failure();
            warn!(
                storage = self.storage.name(),
                error = %e,
                "Failed to persist cache snapshot"
            );
        }
    }
}
