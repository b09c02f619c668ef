//! Chain provider abstraction.

use async_trait::async_trait;
use ledger_cache_core::LedgerEvent;
use ledger_cache_store::TaskHandle;
use tokio::sync::mpsc;

use crate::error::ProviderError;

/// A live push subscription to ledger events.
///
/// Dropping it tears down the underlying stream.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<LedgerEvent>,
    _reader: Option<TaskHandle>,
}

impl Subscription {
    /// Wraps a channel fed by a background reader task.
    pub fn new(events: mpsc::Receiver<LedgerEvent>, reader: TaskHandle) -> Self {
        Self {
            events,
            _reader: Some(reader),
        }
    }

    /// Wraps a channel whose sender is owned elsewhere.
    pub fn from_channel(events: mpsc::Receiver<LedgerEvent>) -> Self {
        Self {
            events,
            _reader: None,
        }
    }

    /// Receives the next event. `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<LedgerEvent> {
        self.events.recv().await
    }
}

/// Read access to the ledger contract's events.
///
/// # Implementing
///
/// `block_number` and `logs` are required; push subscription is optional and
/// defaults to [`ProviderError::Unsupported`], in which case the supervisor
/// falls back to polling right away.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    /// Returns the provider name for logging.
    fn name(&self) -> &str;

    /// Returns the current block height.
    async fn block_number(&self) -> Result<u64, ProviderError>;

    /// Returns the ledger events emitted in `from..=to`, in chain order.
    async fn logs(&self, from: u64, to: u64) -> Result<Vec<LedgerEvent>, ProviderError>;

    /// Opens a push subscription to ledger events.
    async fn subscribe(&self) -> Result<Subscription, ProviderError> {
        Err(ProviderError::Unsupported("subscribe"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PollOnly;

    #[async_trait]
    impl ChainProvider for PollOnly {
        fn name(&self) -> &str {
            "poll-only"
        }

        async fn block_number(&self) -> Result<u64, ProviderError> {
            Ok(7)
        }

        async fn logs(&self, _from: u64, _to: u64) -> Result<Vec<LedgerEvent>, ProviderError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_default_subscribe_is_unsupported() {
        let provider = PollOnly;

        let err = provider.subscribe().await.unwrap_err();
        assert!(matches!(err, ProviderError::Unsupported("subscribe")));
        assert!(!err.is_transient());
        assert_eq!(provider.block_number().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_subscription_ends_when_sender_drops() {
        let (tx, rx) = mpsc::channel(4);
        let mut subscription = Subscription::from_channel(rx);

        tx.send(LedgerEvent::deposit("alice", "tokenx", "1"))
            .await
            .unwrap();
        drop(tx);

        assert!(subscription.recv().await.is_some());
        assert!(subscription.recv().await.is_none());
    }
}
