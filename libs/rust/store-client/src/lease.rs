//! Lease tracker: decides when a lease must be renewed or refetched.
//!
//! Pure computation over [`Lease`] values. For a lease whose TTL exceeds the
//! safety margin the planned instant is always strictly before hard expiry.

use crate::model::{AuthToken, Lease, offset};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default share of the TTL that may elapse before renewing.
pub const DEFAULT_RENEW_FRACTION: f64 = 2.0 / 3.0;

/// Tuning for renewal planning.
#[derive(Debug, Clone)]
pub struct RenewalPolicy {
    renew_fraction: f64,
    safety_margin: Duration,
    static_refresh: Duration,
}

impl Default for RenewalPolicy {
    fn default() -> Self {
        Self {
            renew_fraction: DEFAULT_RENEW_FRACTION,
            safety_margin: Duration::from_secs(60),
            static_refresh: Duration::from_secs(300),
        }
    }
}

impl RenewalPolicy {
    /// Create a policy. The fraction is clamped to 0.1-0.9 and the margin
    /// to at least one second.
    #[must_use]
    pub fn new(renew_fraction: f64, safety_margin: Duration, static_refresh: Duration) -> Self {
        Self {
            renew_fraction: renew_fraction.clamp(0.1, 0.9),
            safety_margin: safety_margin.max(Duration::from_secs(1)),
            static_refresh,
        }
    }

    /// Share of the TTL that may elapse before renewing.
    #[must_use]
    pub const fn renew_fraction(&self) -> f64 {
        self.renew_fraction
    }

    /// Minimum distance kept from hard expiry.
    #[must_use]
    pub const fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Refresh interval for lease-less secrets.
    #[must_use]
    pub const fn static_refresh(&self) -> Duration {
        self.static_refresh
    }
}

/// What to do next with a lease, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalPlan {
    /// Extend the lease in place at the given instant
    Renew {
        /// When to attempt the renewal
        at: DateTime<Utc>,
    },
    /// Fetch a brand new secret at the given instant
    Refetch {
        /// When to refetch
        at: DateTime<Utc>,
    },
    /// The lease is too short to wait at all
    Immediately,
}

impl RenewalPlan {
    /// Planned instant, `None` when due immediately.
    #[must_use]
    pub const fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Renew { at } | Self::Refetch { at } => Some(*at),
            Self::Immediately => None,
        }
    }

    /// Whether the plan calls for an in-place renewal.
    #[must_use]
    pub const fn is_renew(&self) -> bool {
        matches!(self, Self::Renew { .. })
    }

    /// Whether the planned instant has been reached at `now`.
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.at().is_none_or(|at| now >= at)
    }

    /// Time left until the planned instant, zero if already due.
    #[must_use]
    pub fn delay_from(&self, now: DateTime<Utc>) -> Duration {
        self.at()
            .and_then(|at| (at - now).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}

/// Computes renewal plans for leases.
#[derive(Debug, Clone, Default)]
pub struct LeaseTracker {
    policy: RenewalPolicy,
}

impl LeaseTracker {
    /// Create a tracker with the given policy.
    #[must_use]
    pub const fn new(policy: RenewalPolicy) -> Self {
        Self { policy }
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &RenewalPolicy {
        &self.policy
    }

    /// Plan the next action for `lease`.
    ///
    /// Renewable leases renew after `min(ttl * fraction, ttl - margin)`;
    /// non-renewable ones are refetched at `expiry - margin`. Leases no longer
    /// than the margin are due immediately. Static secrets are re-read on the
    /// static refresh interval.
    #[must_use]
    pub fn plan(&self, lease: &Lease) -> RenewalPlan {
        if lease.is_static() {
            return RenewalPlan::Refetch {
                at: offset(lease.issued_at, self.policy.static_refresh),
            };
        }

        let ttl = lease.ttl();
        let margin = self.policy.safety_margin;
        if ttl <= margin {
            return RenewalPlan::Immediately;
        }

        let margin_point = ttl - margin;
        if lease.renewable {
            let fraction_point = self.fraction_of(ttl);
            RenewalPlan::Renew {
                at: offset(lease.issued_at, fraction_point.min(margin_point)),
            }
        } else {
            RenewalPlan::Refetch {
                at: offset(lease.issued_at, margin_point),
            }
        }
    }

    /// Plan the next renewal of the agent's own token.
    ///
    /// Same as [`plan`](Self::plan), except that a token no longer than the
    /// safety margin is still given `ttl * fraction` of its life instead of
    /// being due immediately.
    #[must_use]
    pub fn token_plan(&self, token: &AuthToken) -> RenewalPlan {
        let lease = token.lease();
        if !token.expires() || lease.ttl() > self.policy.safety_margin {
            return self.plan(lease);
        }

        let at = offset(lease.issued_at, self.fraction_of(lease.ttl()));
        if lease.renewable {
            RenewalPlan::Renew { at }
        } else {
            RenewalPlan::Refetch { at }
        }
    }

    /// Whether the agent's own token should be renewed or replaced at `now`.
    #[must_use]
    pub fn token_due(&self, token: &AuthToken, now: DateTime<Utc>) -> bool {
        token.expires() && self.token_plan(token).is_due(now)
    }

    fn fraction_of(&self, ttl: Duration) -> Duration {
        let fraction_ms = (ttl.as_millis() as f64 * self.policy.renew_fraction).round();
        Duration::from_millis(fraction_ms as u64)
    }
}
