//! HTTP client for the credential store.

use crate::{
    config::{RoleConfig, StoreConfig},
    error::{AuthError, FetchError, describe_transport},
    model::{AuthToken, Credential, Lease},
    provider::CredentialSource,
    secrets::{
        AuthResponse, LoginRequest, RenewRequest, RenewResponse, RevokeRequest, SecretResponse,
        field_value,
    },
};
use agent_common::{PlatformError, build_http_client};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use secrecy::SecretString;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

/// Store client speaking the Vault HTTP API.
pub struct StoreClient {
    config: StoreConfig,
    http: Client,
}

impl StoreClient {
    /// Create a new store client.
    ///
    /// # Errors
    ///
    /// Fails if the configured CA bundle is unusable or the HTTP client
    /// cannot be built.
    pub fn new(config: StoreConfig) -> Result<Self, PlatformError> {
        let http = build_http_client(&config.http_config())?;
        Ok(Self { config, http })
    }

    /// Configuration this client was built with.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn send_auth(&self, request: RequestBuilder, role: &str) -> Result<AuthToken, AuthError> {
        let response = request
            .send()
            .await
            .map_err(|e| AuthError::unavailable(describe_transport(&e)))?;

        let status = response.status();
        match status.as_u16() {
            400 => {
                return Err(AuthError::InvalidRole {
                    role: role.to_string(),
                    status: 400,
                });
            }
            401 | 403 => return Err(AuthError::Denied(status.as_u16())),
            _ if !status.is_success() => {
                return Err(AuthError::unavailable(format!("status {status}")));
            }
            _ => {}
        }

        let issued_at = Utc::now();
        let body: AuthResponse = response.json().await.map_err(|_| AuthError::Malformed)?;
        let auth = body.auth;
        if auth.client_token.is_empty() {
            return Err(AuthError::Malformed);
        }

        let token = Zeroizing::new(auth.client_token);
        let lease = Lease::new(auth.accessor, auth.lease_duration, auth.renewable, issued_at);
        debug!(policies = ?auth.policies, "Store token issued");
        Ok(AuthToken::new(token.as_str(), lease))
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, FetchError> {
        let response = request
            .send()
            .await
            .map_err(|e| FetchError::transient(describe_transport(&e)))?;

        let status = response.status();
        match status {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound(path.to_string())),
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                Err(FetchError::PermissionDenied(path.to_string()))
            }
            s if s.is_success() => Ok(response),
            s => Err(FetchError::transient(format!("status {s} for {path}"))),
        }
    }
}

#[async_trait]
impl CredentialSource for StoreClient {
    #[instrument(skip(self, role), fields(role = %role.role, mount = %role.auth_mount))]
    async fn login(&self, role: &RoleConfig) -> Result<AuthToken, AuthError> {
        let jwt = Zeroizing::new(
            tokio::fs::read_to_string(&role.identity_token_path)
                .await
                .map_err(|source| AuthError::IdentityToken {
                    path: role.identity_token_path.display().to_string(),
                    source,
                })?,
        );

        let url = self.config.api_url(&role.login_path());
        let request = self.http.post(&url).json(&LoginRequest {
            role: &role.role,
            jwt: jwt.trim(),
        });

        let token = self.send_auth(request, &role.role).await?;
        info!(
            ttl_secs = token.lease().ttl_seconds,
            renewable = token.lease().renewable,
            "Authenticated with credential store"
        );
        Ok(token)
    }

    #[instrument(skip_all)]
    async fn renew_token(&self, token: &AuthToken) -> Result<AuthToken, AuthError> {
        let url = self.config.api_url("auth/token/renew-self");
        let request = self
            .http
            .post(&url)
            .bearer_auth(token.expose())
            .json(&serde_json::json!({}));

        let renewed = self.send_auth(request, "token").await?;
        debug!(ttl_secs = renewed.lease().ttl_seconds, "Store token renewed");
        Ok(renewed)
    }

    #[instrument(skip(self, token))]
    async fn fetch_secret(
        &self,
        path: &str,
        token: &AuthToken,
    ) -> Result<(Credential, Lease), FetchError> {
        let url = self.config.api_url(path);
        let response = self
            .send(self.http.get(&url).bearer_auth(token.expose()), path)
            .await?;

        let issued_at = Utc::now();
        // Decode errors may quote the body, so they are not propagated.
        let body: SecretResponse = response
            .json()
            .await
            .map_err(|_| FetchError::transient(format!("undecodable secret response for {path}")))?;

        let lease = Lease::new(
            body.lease_id.clone(),
            body.lease_duration,
            body.renewable,
            issued_at,
        );
        let data: BTreeMap<String, SecretString> = body
            .into_fields()
            .into_iter()
            .map(|(field, value)| (field, SecretString::from(field_value(value))))
            .collect();

        if data.is_empty() {
            warn!(path, "Secret has no fields");
        }
        debug!(
            path,
            fields = data.len(),
            ttl_secs = lease.ttl_seconds,
            renewable = lease.renewable,
            "Fetched secret"
        );

        Ok((Credential::new(data, lease.lease_id.clone(), issued_at), lease))
    }

    #[instrument(skip(self, lease, token), fields(lease_id = %lease.lease_id))]
    async fn renew_lease(&self, lease: &Lease, token: &AuthToken) -> Result<Lease, FetchError> {
        let path = "sys/leases/renew";
        let url = self.config.api_url(path);
        let request = self.http.put(&url).bearer_auth(token.expose()).json(&RenewRequest {
            lease_id: &lease.lease_id,
            increment: lease.ttl_seconds,
        });

        let response = self.send(request, path).await?;
        let issued_at = Utc::now();
        let body: RenewResponse = response
            .json()
            .await
            .map_err(|e| FetchError::transient(describe_transport(&e)))?;

        debug!(ttl_secs = body.lease_duration, "Lease renewed");
        Ok(Lease::new(body.lease_id, body.lease_duration, body.renewable, issued_at))
    }

    #[instrument(skip(self, token))]
    async fn revoke_lease(&self, lease_id: &str, token: &AuthToken) -> Result<(), FetchError> {
        let path = "sys/leases/revoke";
        let url = self.config.api_url(path);
        let request = self
            .http
            .put(&url)
            .bearer_auth(token.expose())
            .json(&RevokeRequest { lease_id });

        self.send(request, path).await?;
        info!("Lease revoked");
        Ok(())
    }
}
