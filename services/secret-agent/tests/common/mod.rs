//! Shared fixtures for the agent integration tests.
//!
//! `MockSource` plays the credential store from a script of replies and
//! records when each call happened according to `TokioClock`, which follows
//! tokio's (pausable) time.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use secret_agent::{AgentConfig, Clock};
use secret_store_client::{
    AuthError, AuthToken, Credential, CredentialSource, FetchError, Lease, RoleConfig,
};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Wall clock that advances with tokio time.
pub struct TokioClock {
    anchor: DateTime<Utc>,
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            anchor: DateTime::<Utc>::from_timestamp(1_767_225_600, 0).unwrap(),
            start: Instant::now(),
        })
    }

    pub fn anchor(&self) -> DateTime<Utc> {
        self.anchor
    }

    /// Seconds since the anchor, as a float.
    pub fn offset_secs(&self, at: DateTime<Utc>) -> f64 {
        (at - self.anchor).num_milliseconds() as f64 / 1000.0
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.anchor + TimeDelta::from_std(self.start.elapsed()).unwrap()
    }
}

/// Scripted reply to `fetch_secret`.
#[derive(Debug, Clone)]
pub enum FetchReply {
    Secret {
        password: String,
        lease_id: String,
        ttl: u64,
        renewable: bool,
    },
    NotFound,
    Denied,
    Transient,
}

impl FetchReply {
    pub fn secret(password: &str, lease_id: &str, ttl: u64, renewable: bool) -> Self {
        Self::Secret {
            password: password.to_string(),
            lease_id: lease_id.to_string(),
            ttl,
            renewable,
        }
    }

    fn build(&self, path: &str, now: DateTime<Utc>) -> Result<(Credential, Lease), FetchError> {
        match self {
            Self::Secret {
                password,
                lease_id,
                ttl,
                renewable,
            } => {
                let lease = Lease::new(lease_id.clone(), *ttl, *renewable, now);
                let credential = Credential::from_fields(
                    [("username", "v-k8s-app"), ("password", password.as_str())],
                    lease_id.clone(),
                    now,
                );
                Ok((credential, lease))
            }
            Self::NotFound => Err(FetchError::NotFound(path.to_string())),
            Self::Denied => Err(FetchError::PermissionDenied(path.to_string())),
            Self::Transient => Err(FetchError::transient("status 503 Service Unavailable")),
        }
    }
}

/// In-memory credential store.
pub struct MockSource {
    clock: Arc<TokioClock>,
    replies: Mutex<VecDeque<FetchReply>>,
    last_reply: Mutex<Option<FetchReply>>,
    /// TTL granted by `renew_lease`; `None` makes renewal fail
    renew_ttl: Mutex<Option<u64>>,
    token_ttl: u64,
    /// Number of upcoming logins that fail
    login_failures: AtomicU32,
    refuse_token_renewals: AtomicBool,
    pub logins: AtomicU32,
    pub login_times: Mutex<Vec<DateTime<Utc>>>,
    pub token_renewals: AtomicU32,
    pub fetch_times: Mutex<Vec<DateTime<Utc>>>,
    pub renew_times: Mutex<Vec<DateTime<Utc>>>,
    pub token_renew_times: Mutex<Vec<DateTime<Utc>>>,
    pub revoked: Mutex<Vec<String>>,
}

impl MockSource {
    /// Source answering fetches with `replies` in order, repeating the last.
    pub fn new(clock: Arc<TokioClock>, replies: Vec<FetchReply>) -> Arc<Self> {
        Self::with_token_ttl(clock, replies, 0)
    }

    pub fn with_token_ttl(clock: Arc<TokioClock>, replies: Vec<FetchReply>, token_ttl: u64) -> Arc<Self> {
        Arc::new(Self {
            clock,
            replies: Mutex::new(replies.into()),
            last_reply: Mutex::new(None),
            renew_ttl: Mutex::new(None),
            token_ttl,
            login_failures: AtomicU32::new(0),
            refuse_token_renewals: AtomicBool::new(false),
            logins: AtomicU32::new(0),
            login_times: Mutex::new(Vec::new()),
            token_renewals: AtomicU32::new(0),
            fetch_times: Mutex::new(Vec::new()),
            renew_times: Mutex::new(Vec::new()),
            token_renew_times: Mutex::new(Vec::new()),
            revoked: Mutex::new(Vec::new()),
        })
    }

    pub fn grant_renewals(&self, ttl: u64) {
        *self.renew_ttl.lock().unwrap() = Some(ttl);
    }

    /// Make the next `count` logins fail as if the store were down.
    pub fn fail_logins(&self, count: u32) {
        self.login_failures.store(count, Ordering::SeqCst);
    }

    /// Make every token renewal fail with a denial.
    pub fn refuse_token_renewals(&self) {
        self.refuse_token_renewals.store(true, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetch_times.lock().unwrap().len()
    }

    pub fn renewals(&self) -> usize {
        self.renew_times.lock().unwrap().len()
    }

    fn token(&self, now: DateTime<Utc>) -> AuthToken {
        AuthToken::new(
            "hvs.mock-token",
            Lease::new("accessor-1", self.token_ttl, true, now),
        )
    }
}

#[async_trait]
impl CredentialSource for MockSource {
    async fn login(&self, _role: &RoleConfig) -> Result<AuthToken, AuthError> {
        let now = self.clock.now();
        self.logins.fetch_add(1, Ordering::SeqCst);
        self.login_times.lock().unwrap().push(now);

        let failing = self
            .login_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AuthError::unavailable("status 503 Service Unavailable"));
        }
        Ok(self.token(now))
    }

    async fn renew_token(&self, _token: &AuthToken) -> Result<AuthToken, AuthError> {
        let now = self.clock.now();
        self.token_renewals.fetch_add(1, Ordering::SeqCst);
        self.token_renew_times.lock().unwrap().push(now);
        if self.refuse_token_renewals.load(Ordering::SeqCst) {
            return Err(AuthError::Denied(403));
        }
        Ok(self.token(now))
    }

    async fn fetch_secret(
        &self,
        path: &str,
        _token: &AuthToken,
    ) -> Result<(Credential, Lease), FetchError> {
        let now = self.clock.now();
        self.fetch_times.lock().unwrap().push(now);

        let next = self.replies.lock().unwrap().pop_front();
        let reply = match next {
            Some(reply) => {
                *self.last_reply.lock().unwrap() = Some(reply.clone());
                reply
            }
            None => self
                .last_reply
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(FetchReply::NotFound),
        };
        reply.build(path, now)
    }

    async fn renew_lease(&self, lease: &Lease, _token: &AuthToken) -> Result<Lease, FetchError> {
        let now = self.clock.now();
        self.renew_times.lock().unwrap().push(now);
        match *self.renew_ttl.lock().unwrap() {
            Some(ttl) => Ok(Lease::new(lease.lease_id.clone(), ttl, true, now)),
            None => Err(FetchError::transient("status 500 Internal Server Error")),
        }
    }

    async fn revoke_lease(&self, lease_id: &str, _token: &AuthToken) -> Result<(), FetchError> {
        self.revoked.lock().unwrap().push(lease_id.to_string());
        Ok(())
    }
}

/// Agent configuration writing to `output`.
pub fn agent_config(output: &Path) -> AgentConfig {
    AgentConfig::new(
        Url::parse("http://127.0.0.1:8200").unwrap(),
        "app",
        "database/creds/app",
        output,
    )
}

/// Poll `cond` once per virtual second until it holds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("condition not reached");
}
