//! Error types for the cache store.

use std::io;

use thiserror::Error;

/// Error del store de cache.
#[derive(Debug, Error)]
pub enum StoreError {
    /// La configuracion no es valida.
    #[error("invalid store configuration: {0}")]
    InvalidConfig(String),
}

/// Errores de persistencia del snapshot.
///
/// Nunca se propagan a los llamadores del store: se registran y el store
/// sigue sirviendo desde memoria.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read snapshot '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write snapshot '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to rename '{from}' to '{to}': {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse snapshot: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

/// Error devuelto por el coordinador de lecturas.
///
/// Es `Clone` porque el mismo resultado se entrega a todos los que esperan
/// la misma key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// The underlying fetch failed. Nothing was cached.
    #[error("fetch for '{key}' failed: {message}")]
    Fetch { key: String, message: String },

    /// The value could not be converted to or from JSON.
    #[error("value for '{key}' could not be decoded: {message}")]
    Decode { key: String, message: String },

    /// The fetch task panicked or was aborted.
    #[error("fetch task for '{key}' did not complete: {message}")]
    Join { key: String, message: String },
}

impl CoordinatorError {
    /// Creates a fetch error, keeping the full context chain of the cause.
    pub fn fetch(key: impl Into<String>, cause: &anyhow::Error) -> Self {
        Self::Fetch {
            key: key.into(),
            message: format!("{:#}", cause),
        }
    }

    pub fn decode(key: impl Into<String>, cause: &serde_json::Error) -> Self {
        Self::Decode {
            key: key.into(),
            message: cause.to_string(),
        }
    }

    /// Returns the key of the read that failed.
    pub fn key(&self) -> &str {
        match self {
            Self::Fetch { key, .. } | Self::Decode { key, .. } | Self::Join { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_keeps_context() {
        let cause = anyhow::anyhow!("connection refused").context("rpc call");
        let err = CoordinatorError::fetch("balance:a:b:fhe", &cause);

        assert_eq!(err.key(), "balance:a:b:fhe");
        assert_eq!(
            err.to_string(),
            "fetch for 'balance:a:b:fhe' failed: rpc call: connection refused"
        );
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Write {
            path: "/tmp/cache.json".into(),
            source: io::Error::other("disk full"),
        };
        assert!(err.to_string().contains("/tmp/cache.json"));
    }
}
