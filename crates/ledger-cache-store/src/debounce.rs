//! Debounced refetch scheduling.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

/// Delay applied when none is configured.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Collapses bursts of refetch triggers into one fetch.
///
/// Each `schedule` replaces the pending one and restarts the delay. Once the
/// delay elapses the fetch is issued on its own task and is no longer
/// cancellable through the debouncer.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules `fetch` after the delay, dropping any unissued one.
    pub fn schedule<F, Fut>(&self, fetch: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(fetch());
        });

        if let Some(previous) = self.pending.lock().replace(timer) {
            previous.abort();
            trace!("Replaced pending debounced fetch");
        }
    }

    /// Drops the pending fetch if it was not issued yet.
    pub fn cancel(&self) -> bool {
        match self.pending.lock().take() {
            Some(timer) if !timer.is_finished() => {
                timer.abort();
                true
            },
            _ => false,
        }
    }

    /// Returns true while a fetch is waiting for its delay.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}
