//! Sidecar Controller
//!
//! Wires the store client, publisher and scheduler together, runs the
//! scheduler until a stop signal and then performs best-effort teardown.

use crate::clock::{Clock, SystemClock};
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::handle::CredentialHandle;
use crate::publisher::AtomicPublisher;
use crate::scheduler::{Finished, Scheduler, SchedulerSettings};
use crate::shutdown::{ShutdownCoordinator, wait_for_signal};
use secret_store_client::{CredentialSource, StoreClient};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the agent's components for one process lifetime.
pub struct Controller<S> {
    config: AgentConfig,
    source: Arc<S>,
    publisher: AtomicPublisher,
    handle: CredentialHandle,
    clock: Arc<dyn Clock>,
}

impl Controller<StoreClient> {
    /// Build a controller talking to the configured store.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built, e.g. an unusable CA bundle.
    pub fn from_config(config: AgentConfig) -> Result<Self, AgentError> {
        let client = StoreClient::new(config.store_config())?;
        Ok(Self::with_source(config, Arc::new(client)))
    }
}

impl<S: CredentialSource + 'static> Controller<S> {
    /// Build a controller around an existing credential source.
    #[must_use]
    pub fn with_source(config: AgentConfig, source: Arc<S>) -> Self {
        let publisher = AtomicPublisher::new(&config.output_path, config.file_mode);
        Self {
            config,
            source,
            publisher,
            handle: CredentialHandle::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Handle to the last published credential.
    #[must_use]
    pub fn handle(&self) -> CredentialHandle {
        self.handle.clone()
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Fails only if signal handlers cannot be installed; the agent is
    /// stopped and torn down in that case too.
    pub async fn run(self) -> Result<(), AgentError> {
        let mut failure = None;
        self.run_until(async {
            if let Err(e) = wait_for_signal().await {
                failure = Some(e);
            }
        })
        .await;

        failure.map_or(Ok(()), |e| {
            Err(AgentError::Task(format!("cannot install signal handlers: {e}")))
        })
    }

    /// Run until `stop` completes, then shut down and tear down.
    pub async fn run_until<F>(self, stop: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            store = %self.config.store_addr,
            secret_path = %self.config.secret_path,
            output = %self.config.output_path.display(),
            "Starting secret agent"
        );

        let mut coordinator = ShutdownCoordinator::new();
        let scheduler = Scheduler::new(
            Arc::clone(&self.source),
            self.publisher.clone(),
            SchedulerSettings::from_config(&self.config),
            Arc::clone(&self.clock),
            self.handle.clone(),
        );
        let signal = coordinator.subscribe();
        coordinator.spawn("renewal-scheduler", scheduler.run(signal));

        stop.await;

        let finished = coordinator.shutdown(self.config.shutdown_grace).await.pop();
        if finished.is_none() {
            warn!(
                grace_secs = self.config.shutdown_grace.as_secs(),
                "Renewal scheduler did not stop in time"
            );
        }

        self.teardown(finished.unwrap_or_default()).await;
        info!("Secret agent stopped");
    }

    async fn teardown(&self, finished: Finished) {
        if self.config.revoke_on_shutdown {
            self.revoke(&finished).await;
        }

        if self.config.remove_on_shutdown {
            let publisher = self.publisher.clone();
            match tokio::task::spawn_blocking(move || publisher.remove()).await {
                Ok(Ok(removed)) => debug!(removed, "Published file cleanup done"),
                Ok(Err(e)) => warn!(error = %e, "Failed to remove published file"),
                Err(e) => warn!(error = %e, "File cleanup task failed"),
            }
        }
    }

    async fn revoke(&self, finished: &Finished) {
        let Some(token) = &finished.token else {
            debug!("No store token, nothing revoked");
            return;
        };

        for lease in finished.leases().filter(|lease| !lease.lease_id.is_empty()) {
            let revoke = self.source.revoke_lease(&lease.lease_id, token);
            match tokio::time::timeout(self.config.request_timeout, revoke).await {
                Ok(Ok(())) => info!(lease_id = %lease.lease_id, "Revoked lease on shutdown"),
                Ok(Err(e)) => warn!(lease_id = %lease.lease_id, error = %e, "Failed to revoke lease on shutdown"),
                Err(_) => warn!(lease_id = %lease.lease_id, "Lease revocation timed out"),
            }
        }
    }
}
