//! Handles for cancellable background tasks.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle for controlling a running background task.
///
/// The task receives a shutdown receiver and is expected to exit once it
/// observes `true`. Dropping the handle signals shutdown.
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Spawns `run` with a fresh shutdown receiver.
    pub fn spawn<F, Fut>(name: &'static str, run: F) -> Self
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run(shutdown_rx));

        Self {
            name,
            shutdown_tx,
            join: Some(join),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals the task to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Returns true once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|join| join.is_finished())
    }

    /// Signals the task and waits for it to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(join) = self.join.take()
            && let Err(e) = join.await
        {
            debug!(task = self.name, error = %e, "Background task ended abnormally");
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resolves once the shutdown flag is set or its sender is gone.
pub async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}
