//! Credential source abstraction.
//!
//! The renewal loop only talks to the store through this trait, so it can be
//! driven by an in-memory double in tests.

use crate::config::RoleConfig;
use crate::error::{AuthError, FetchError};
use crate::model::{AuthToken, Credential, Lease};
use async_trait::async_trait;

/// Operations the agent needs from a credential store.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Exchange the workload identity for a store token.
    async fn login(&self, role: &RoleConfig) -> Result<AuthToken, AuthError>;

    /// Extend the current token's lease.
    async fn renew_token(&self, token: &AuthToken) -> Result<AuthToken, AuthError>;

    /// Read the secret at `path`.
    async fn fetch_secret(
        &self,
        path: &str,
        token: &AuthToken,
    ) -> Result<(Credential, Lease), FetchError>;

    /// Extend a secret lease in place.
    async fn renew_lease(&self, lease: &Lease, token: &AuthToken) -> Result<Lease, FetchError>;

    /// Revoke a secret lease.
    async fn revoke_lease(&self, lease_id: &str, token: &AuthToken) -> Result<(), FetchError>;
}
