//! Credential, lease and token types.
//!
//! A [`Credential`] is immutable: renewal produces a new value that
//! supersedes the old one. Secret values live in [`SecretString`] and every
//! `Debug` impl here prints field names only.

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Time-bounded grant of validity for a secret or token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Opaque lease identifier, empty for lease-less secrets
    pub lease_id: String,
    /// Lifetime granted at issuance
    pub ttl_seconds: u64,
    /// Whether the lease can be extended without a refetch
    pub renewable: bool,
    /// When the store granted the lease
    pub issued_at: DateTime<Utc>,
}

impl Lease {
    /// Create a lease.
    #[must_use]
    pub fn new(
        lease_id: impl Into<String>,
        ttl_seconds: u64,
        renewable: bool,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lease_id: lease_id.into(),
            ttl_seconds,
            renewable,
            issued_at,
        }
    }

    /// Lifetime as a [`Duration`].
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Hard expiry, `issued_at + ttl`.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        offset(self.issued_at, self.ttl())
    }

    /// Static secrets carry neither a lease id nor a TTL.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.ttl_seconds == 0 && self.lease_id.is_empty()
    }

    /// Whether the lease has run out at `now`. Static leases never do.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_static() && now >= self.expires_at()
    }
}

/// `at + delta`, saturating at the end of representable time.
pub(crate) fn offset(at: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(delta)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Secret fields fetched from the store.
#[derive(Clone)]
pub struct Credential {
    data: BTreeMap<String, SecretString>,
    lease_id: String,
    issued_at: DateTime<Utc>,
}

impl Credential {
    /// Create a credential.
    #[must_use]
    pub fn new(
        data: BTreeMap<String, SecretString>,
        lease_id: impl Into<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            data,
            lease_id: lease_id.into(),
            issued_at,
        }
    }

    /// Build from plain field/value pairs.
    pub fn from_fields<I, K, V>(fields: I, lease_id: impl Into<String>, issued_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = fields
            .into_iter()
            .map(|(k, v)| (k.into(), SecretString::from(v.into())))
            .collect();
        Self::new(data, lease_id, issued_at)
    }

    /// Secret fields, keyed by name.
    #[must_use]
    pub const fn data(&self) -> &BTreeMap<String, SecretString> {
        &self.data
    }

    /// Value of one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&SecretString> {
        self.data.get(field)
    }

    /// Field names, without values.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Lease the credential was issued under.
    #[must_use]
    pub fn lease_id(&self) -> &str {
        &self.lease_id
    }

    /// When the credential was fetched.
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Successor credential carrying the same values under a renewed lease.
    #[must_use]
    pub fn renewed(&self, lease: &Lease) -> Self {
        Self {
            data: self.data.clone(),
            lease_id: lease.lease_id.clone(),
            issued_at: lease.issued_at,
        }
    }

    /// Whether both credentials hold identical fields and values.
    #[must_use]
    pub fn same_values(&self, other: &Self) -> bool {
        self.data.len() == other.data.len()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.expose_secret() == vb.expose_secret())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("fields", &self.data.keys().collect::<Vec<_>>())
            .field("lease_id", &self.lease_id)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// The agent's own session with the store.
#[derive(Clone)]
pub struct AuthToken {
    token: SecretString,
    lease: Lease,
}

impl AuthToken {
    /// Wrap a raw token and the lease it was issued with.
    #[must_use]
    pub fn new(token: impl Into<String>, lease: Lease) -> Self {
        Self {
            token: SecretString::from(token.into()),
            lease,
        }
    }

    /// Token lease. The lease id is the token accessor, never the token.
    #[must_use]
    pub const fn lease(&self) -> &Lease {
        &self.lease
    }

    /// Tokens with a zero TTL never expire.
    #[must_use]
    pub const fn expires(&self) -> bool {
        self.lease.ttl_seconds > 0
    }

    pub(crate) fn expose(&self) -> &str {
        self.token.expose_secret()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"[REDACTED]")
            .field("lease", &self.lease)
            .finish()
    }
}
