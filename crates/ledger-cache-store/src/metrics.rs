//! Cache metrics recording.

use metrics::{counter, gauge, histogram};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Motivo por el que una entry salio del store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Expirada (lectura o barrido).
    Ttl,
    /// Desalojada por capacidad.
    Capacity,
    /// Borrada explicitamente (`delete`, `clear`).
    Manual,
    /// Borrada por invalidacion de patron.
    Pattern,
}

impl EvictionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionReason::Ttl => "ttl",
            EvictionReason::Capacity => "capacity",
            EvictionReason::Manual => "manual",
            EvictionReason::Pattern => "pattern",
        }
    }
}

/// Registra las descripciones de las metricas de cache.
/// Llamar una vez al inicio, despues de instalar el recorder.
pub fn register_cache_metrics() {
    metrics::describe_counter!("ledger_cache_hits_total", "Total number of cache hits");
    metrics::describe_counter!("ledger_cache_misses_total", "Total number of cache misses");
    metrics::describe_counter!(
        "ledger_cache_evictions_total",
        "Total number of entries removed from the cache, by reason"
    );
    metrics::describe_gauge!("ledger_cache_entries", "Current number of entries in cache");
    metrics::describe_histogram!(
        "ledger_cache_operation_seconds",
        "Time spent on cache operations"
    );
    metrics::describe_counter!(
        "ledger_cache_persist_failures_total",
        "Snapshot writes that failed"
    );
}

/// Recorder de metricas de cache.
/// Los contadores atomicos alimentan el hit rate de `stats()`.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un cache hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!("ledger_cache_hits_total").increment(1);
    }

    /// Registra un cache miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!("ledger_cache_misses_total").increment(1);
    }

    /// Registra `count` evictions con el motivo dado
    pub fn record_evictions(&self, reason: EvictionReason, count: usize) {
        if count == 0 {
            return;
        }
        counter!("ledger_cache_evictions_total", "reason" => reason.as_str())
            .increment(count as u64);
    }

    /// Actualiza el gauge de entries
    pub fn update_entry_count(&self, count: usize) {
        gauge!("ledger_cache_entries").set(count as f64);
    }

    /// Registra la duracion de una operacion
    pub fn record_operation_duration(&self, operation: &'static str, duration: Duration) {
        histogram!("ledger_cache_operation_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }

    pub fn record_persist_failure(&self) {
        counter!("ledger_cache_persist_failures_total").increment(1);
    }

    /// Calcula hit rate en [0, 1]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 { 0.0 } else { hits / total }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_metrics_hit_rate() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.hit_rate(), 0.0);

        // 3 hits, 1 miss = 75% hit rate
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();

        assert!((metrics.hit_rate() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = CacheMetrics::new();
        let clone = metrics.clone();

        clone.record_hit();
        clone.record_miss();
        clone.record_miss();

        assert_eq!(metrics.hits(), 1);
        assert_eq!(metrics.misses(), 2);
    }

    #[test]
    fn test_eviction_reason_labels() {
        assert_eq!(EvictionReason::Ttl.as_str(), "ttl");
        assert_eq!(EvictionReason::Capacity.as_str(), "capacity");
        assert_eq!(EvictionReason::Manual.as_str(), "manual");
        assert_eq!(EvictionReason::Pattern.as_str(), "pattern");
    }
}
