//! Graceful Shutdown Module
//!
//! Tasks are tracked in a [`JoinSet`] and observe a watch-based
//! [`ShutdownSignal`] at their own safe points. Tasks still running when the
//! grace period ends are aborted.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Shutdown coordinator for graceful termination.
pub struct ShutdownCoordinator<T> {
    shutdown_tx: watch::Sender<bool>,
    tasks: JoinSet<T>,
}

impl<T: Send + 'static> ShutdownCoordinator<T> {
    /// Creates a new shutdown coordinator
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            tasks: JoinSet::new(),
        }
    }

    /// Gets a shutdown signal
    #[must_use]
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.shutdown_tx.subscribe(),
        }
    }

    /// Spawns a tracked task. The task is expected to watch its own signal.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        debug!(task = name, "Spawning background task");
        self.tasks.spawn(future);
    }

    /// Signals shutdown without waiting.
    pub fn trigger(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Signals shutdown and collects task results within `timeout`.
    ///
    /// Tasks that miss the deadline are aborted and contribute nothing.
    pub async fn shutdown(mut self, timeout: Duration) -> Vec<T> {
        info!("Initiating graceful shutdown");
        self.trigger();

        let mut finished = Vec::with_capacity(self.tasks.len());
        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                match result {
                    Ok(value) => finished.push(value),
                    Err(e) => warn!(error = %e, "Task failed during shutdown"),
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = self.tasks.len(),
                "Shutdown timeout reached, aborting remaining tasks"
            );
            self.tasks.abort_all();
            while self.tasks.join_next().await.is_some() {}
        }

        info!("Shutdown complete");
        finished
    }

    /// Returns the number of active tasks
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl<T: Send + 'static> Default for ShutdownCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Shutdown signal receiver.
#[derive(Clone)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Completes once shutdown has been signaled, or the coordinator is gone.
    pub async fn cancelled(&mut self) {
        let _ = self.receiver.wait_for(|stop| *stop).await;
    }

    /// Checks if shutdown has been signaled (non-blocking)
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.receiver.borrow()
    }
}

/// Waits for SIGTERM or SIGINT.
///
/// # Errors
///
/// Fails if a signal handler cannot be installed.
pub async fn wait_for_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, initiating shutdown");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, initiating shutdown");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        info!("Received Ctrl+C, initiating shutdown");
    }

    Ok(())
}
