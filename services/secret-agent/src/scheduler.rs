//! Renewal Scheduler
//!
//! A single task drives the agent through
//! `Idle -> Authenticating -> Fetching -> Publishing -> Sleeping`, falling
//! into `Failed` on any error and retrying with capped, jittered backoff.
//! It never gives up on its own; only the shutdown signal stops it.
//!
//! Every wait, network call included, races the shutdown signal. Publishing
//! does not: a started write always completes or is discarded as a whole.

use crate::clock::Clock;
use crate::config::AgentConfig;
use crate::handle::CredentialHandle;
use crate::publisher::{AtomicPublisher, PublishOutcome};
use crate::shutdown::ShutdownSignal;
use agent_common::BackoffPolicy;
use secret_store_client::{
    AuthError, AuthToken, Credential, CredentialSource, FetchError, Lease, LeaseTracker,
    RoleConfig,
};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

/// Scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Not started
    Idle,
    /// Obtaining or renewing the store token
    Authenticating,
    /// Reading or renewing the secret
    Fetching,
    /// Writing the secret file
    Publishing,
    /// Waiting for the next renewal instant
    Sleeping,
    /// Backing off after an error
    Failed,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Authenticating => "authenticating",
            Self::Fetching => "fetching",
            Self::Publishing => "publishing",
            Self::Sleeping => "sleeping",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Secret to keep fresh
    pub secret_path: String,
    /// Login role
    pub role: RoleConfig,
    /// Renewal planning
    pub tracker: LeaseTracker,
    /// Retry delays
    pub backoff: BackoffPolicy,
    /// Shortest sleep between cycles
    pub min_sleep: Duration,
}

impl SchedulerSettings {
    /// Settings derived from the agent configuration.
    #[must_use]
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            secret_path: config.secret_path.clone(),
            role: config.role_config(),
            tracker: config.lease_tracker(),
            backoff: BackoffPolicy::new(config.backoff_config()),
            min_sleep: Duration::from_secs(1),
        }
    }
}

/// What the scheduler held when it stopped.
#[derive(Debug, Default)]
pub struct Finished {
    /// Last store token
    pub token: Option<AuthToken>,
    /// Lease of the last published credential
    pub lease: Option<Lease>,
    /// Lease of a credential fetched but never published
    pub pending: Option<Lease>,
}

impl Finished {
    /// Every distinct lease still held, published or not.
    pub fn leases(&self) -> impl Iterator<Item = &Lease> {
        let pending = self.pending.as_ref().filter(|pending| {
            self.lease
                .as_ref()
                .is_none_or(|lease| lease.lease_id != pending.lease_id)
        });
        self.lease.iter().chain(pending)
    }
}

/// Drives the fetch, publish and renew cycle.
pub struct Scheduler<S> {
    source: Arc<S>,
    publisher: AtomicPublisher,
    clock: Arc<dyn Clock>,
    handle: CredentialHandle,
    settings: SchedulerSettings,
    state_tx: watch::Sender<SchedulerState>,
    token: Option<AuthToken>,
    current: Option<(Credential, Lease)>,
    pending: Option<(Credential, Lease)>,
    resume: SchedulerState,
    attempts: u32,
    just_authenticated: bool,
    expiry_reported: bool,
    last_error: Option<String>,
}

impl<S: CredentialSource + 'static> Scheduler<S> {
    /// Create a scheduler.
    #[must_use]
    pub fn new(
        source: Arc<S>,
        publisher: AtomicPublisher,
        settings: SchedulerSettings,
        clock: Arc<dyn Clock>,
        handle: CredentialHandle,
    ) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Idle);
        Self {
            source,
            publisher,
            clock,
            handle,
            settings,
            state_tx,
            token: None,
            current: None,
            pending: None,
            resume: SchedulerState::Authenticating,
            attempts: 0,
            just_authenticated: false,
            expiry_reported: false,
            last_error: None,
        }
    }

    /// Follow state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state_tx.subscribe()
    }

    /// Run until `shutdown` fires.
    #[instrument(name = "renewal_loop", skip_all, fields(secret_path = %self.settings.secret_path))]
    pub async fn run(mut self, mut shutdown: ShutdownSignal) -> Finished {
        info!("Renewal scheduler started");
        let mut state = SchedulerState::Authenticating;

        while !shutdown.is_shutdown() {
            self.state_tx.send_replace(state);
            let next = match state {
                SchedulerState::Idle | SchedulerState::Authenticating => {
                    self.authenticate(&mut shutdown).await
                }
                SchedulerState::Fetching => self.fetch(&mut shutdown).await,
                SchedulerState::Publishing => Some(self.publish().await),
                SchedulerState::Sleeping => self.sleep(&mut shutdown).await,
                SchedulerState::Failed => self.back_off(&mut shutdown).await,
            };
            match next {
                Some(next) => state = next,
                None => break,
            }
        }

        info!(state = %state, "Renewal scheduler stopped");
        self.state_tx.send_replace(SchedulerState::Idle);
        Finished {
            token: self.token,
            lease: self.current.map(|(_, lease)| lease),
            pending: self.pending.map(|(_, lease)| lease),
        }
    }

    async fn authenticate(&mut self, shutdown: &mut ShutdownSignal) -> Option<SchedulerState> {
        let now = self.clock.now();
        let mut renewed = None;
        if let Some(token) = &self.token {
            if token.lease().renewable && token.expires() && !token.lease().is_expired_at(now) {
                match cancellable(shutdown, self.source.renew_token(token)).await? {
                    Ok(token) if !token.lease().is_expired_at(self.clock.now()) => {
                        renewed = Some(token);
                    }
                    Ok(_) => debug!("Renewed token already expired, logging in again"),
                    Err(e) => warn!(error = %e, "Token renewal failed, logging in again"),
                }
            }
        }

        let result = match renewed {
            Some(token) => Ok(token),
            None => cancellable(shutdown, self.source.login(&self.settings.role)).await?,
        };

        match result {
            Ok(token) => {
                self.token = Some(token);
                self.just_authenticated = true;
                Some(SchedulerState::Fetching)
            }
            Err(e) => {
                self.auth_failed(&e);
                Some(SchedulerState::Failed)
            }
        }
    }

    async fn fetch(&mut self, shutdown: &mut ShutdownSignal) -> Option<SchedulerState> {
        let now = self.clock.now();
        let Some(token) = self.token.clone() else {
            return Some(SchedulerState::Authenticating);
        };
        if !self.just_authenticated && self.settings.tracker.token_due(&token, now) {
            debug!("Store token due, re-authenticating");
            return Some(SchedulerState::Authenticating);
        }
        self.just_authenticated = false;

        if let Some((_, lease)) = &self.pending {
            if !lease.is_expired_at(now) {
                return Some(SchedulerState::Publishing);
            }
            debug!(lease_id = %lease.lease_id, "Unpublished credential expired, fetching again");
            self.pending = None;
        }

        let plan = self
            .current
            .as_ref()
            .map(|(_, lease)| self.settings.tracker.plan(lease));
        if plan.is_some_and(|plan| !plan.is_due(now)) {
            return Some(SchedulerState::Sleeping);
        }

        let mut fetched = None;
        if let (Some(plan), Some((credential, lease))) = (plan, &self.current) {
            if plan.is_renew() {
                match cancellable(shutdown, self.source.renew_lease(lease, &token)).await? {
                    Ok(renewed) if renewed.ttl() > self.settings.tracker.policy().safety_margin() => {
                        fetched = Some(Ok((credential.renewed(&renewed), renewed)));
                    }
                    Ok(renewed) => info!(
                        ttl_secs = renewed.ttl_seconds,
                        "Lease can no longer be extended, fetching a new secret"
                    ),
                    Err(e) => debug!(error = %e, "Lease renewal failed, fetching a new secret"),
                }
            }
        }

        let result = match fetched {
            Some(result) => result,
            None => {
                cancellable(
                    shutdown,
                    self.source.fetch_secret(&self.settings.secret_path, &token),
                )
                .await?
            }
        };

        match result {
            Ok(next) => {
                self.pending = Some(next);
                Some(SchedulerState::Publishing)
            }
            Err(e) => {
                self.fetch_failed(&e);
                Some(SchedulerState::Failed)
            }
        }
    }

    async fn publish(&mut self) -> SchedulerState {
        let Some((credential, lease)) = self.pending.clone() else {
            return SchedulerState::Sleeping;
        };

        let publisher = self.publisher.clone();
        let (to_write, lease_to_write) = (credential.clone(), lease.clone());
        let result =
            tokio::task::spawn_blocking(move || publisher.publish(&to_write, &lease_to_write)).await;

        match result {
            Ok(Ok(outcome)) => {
                if outcome == PublishOutcome::Unchanged {
                    debug!("Credential values unchanged");
                }
                self.pending = None;
                self.handle.store(credential.clone());
                self.current = Some((credential, lease));
                self.attempts = 0;
                self.expiry_reported = false;
                self.last_error = None;
                SchedulerState::Sleeping
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to publish credential, previous file kept");
                self.last_error = Some(e.to_string());
                self.resume = SchedulerState::Fetching;
                SchedulerState::Failed
            }
            Err(e) => {
                error!(error = %e, "Publish task failed");
                self.last_error = Some(e.to_string());
                self.resume = SchedulerState::Fetching;
                SchedulerState::Failed
            }
        }
    }

    async fn sleep(&mut self, shutdown: &mut ShutdownSignal) -> Option<SchedulerState> {
        let now = self.clock.now();
        let Some((_, lease)) = &self.current else {
            return Some(SchedulerState::Fetching);
        };

        let tracker = &self.settings.tracker;
        let mut delay = tracker.plan(lease).delay_from(now);
        if let Some(token) = self.token.as_ref().filter(|t| t.expires()) {
            delay = delay.min(tracker.token_plan(token).delay_from(now));
        }
        let delay = delay.max(self.settings.min_sleep);

        debug!(delay_secs = delay.as_secs(), "Sleeping until next renewal");
        cancellable(shutdown, tokio::time::sleep(delay)).await?;
        Some(SchedulerState::Fetching)
    }

    async fn back_off(&mut self, shutdown: &mut ShutdownSignal) -> Option<SchedulerState> {
        let backoff = &self.settings.backoff;
        self.attempts += 1;
        let delay = if backoff.is_exhausted(self.attempts) {
            warn!(
                attempts = self.attempts,
                pause_secs = backoff.max_delay().as_secs(),
                last_error = self.last_error.as_deref().unwrap_or("unknown"),
                "Retry budget exhausted, pausing before a fresh cycle"
            );
            self.attempts = 0;
            backoff.max_delay()
        } else {
            backoff.delay_for_attempt(self.attempts - 1)
        };

        if let Some((_, lease)) = &self.current {
            if !self.expiry_reported && lease.is_expired_at(self.clock.now()) {
                warn!(lease_id = %lease.lease_id, "Published credential has expired");
                self.expiry_reported = true;
            }
        }

        debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            resume = %self.resume,
            "Backing off"
        );
        cancellable(shutdown, tokio::time::sleep(delay)).await?;
        Some(self.resume)
    }

    fn auth_failed(&mut self, err: &AuthError) {
        if err.is_retryable() {
            warn!(error = %err, "Authentication failed");
        } else {
            error!(error = %err, role = %self.settings.role.role, "Authentication rejected");
        }
        self.token = None;
        self.last_error = Some(err.to_string());
        self.resume = SchedulerState::Authenticating;
    }

    fn fetch_failed(&mut self, err: &FetchError) {
        if err.is_retryable() {
            debug!(error = %err, "Transient fetch failure");
        } else {
            error!(error = %err, path = %self.settings.secret_path, "Secret unavailable");
        }
        self.last_error = Some(err.to_string());
        self.resume = if matches!(err, FetchError::PermissionDenied(_)) {
            self.token = None;
            SchedulerState::Authenticating
        } else {
            SchedulerState::Fetching
        };
    }
}

/// Await `future` unless shutdown fires first.
async fn cancellable<F: Future>(shutdown: &mut ShutdownSignal, future: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => None,
        output = future => Some(output),
    }
}
