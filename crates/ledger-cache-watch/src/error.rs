//! Error types for chain providers and watchers.

use ledger_cache_core::CoreError;

/// Errors that can occur when talking to the chain.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// The node could not be reached or the connection dropped.
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error.
    #[error("rpc error in {method}: {message} (code {code})")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    /// The response could not be interpreted.
    #[error("decode error: {0}")]
    Decode(String),

    /// A request did not complete in time.
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// The provider does not implement this capability.
    #[error("{0} is not supported by this provider")]
    Unsupported(&'static str),

    /// An address argument is not a 20-byte hex address.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    /// Invalid provider configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ProviderError {
    /// Creates a new transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates a new decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Creates a new JSON-RPC error.
    pub fn rpc(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Rpc {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout { .. } | Self::Rpc { .. }
        )
    }
}

/// Errors returned when starting a watch session.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The session has no usable account.
    #[error("invalid session: {0}")]
    InvalidSession(#[from] CoreError),

    /// Invalid watcher configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
