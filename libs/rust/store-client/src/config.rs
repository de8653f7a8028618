//! Store client configuration.

use agent_common::HttpConfig;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default location of the projected service account token.
pub const DEFAULT_IDENTITY_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Connection settings for the credential store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Store server address
    pub addr: Url,
    /// Request timeout
    pub timeout: Duration,
    /// Extra CA bundle for the store's TLS certificate
    pub ca_cert_path: Option<PathBuf>,
}

impl StoreConfig {
    /// Create a new configuration.
    #[must_use]
    pub const fn new(addr: Url) -> Self {
        Self {
            addr,
            timeout: Duration::from_secs(10),
            ca_cert_path: None,
        }
    }

    /// Set request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Trust an extra CA bundle.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }

    /// HTTP client settings derived from this configuration.
    #[must_use]
    pub fn http_config(&self) -> HttpConfig {
        let mut http = HttpConfig::default()
            .with_timeout(self.timeout)
            .with_connect_timeout(self.timeout.min(Duration::from_secs(5)));
        if let Some(path) = &self.ca_cert_path {
            http = http.with_ca_cert(path);
        }
        http
    }

    /// Absolute URL for an API path such as `auth/kubernetes/login`.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.addr.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Role used to exchange the workload identity for a store token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleConfig {
    /// Auth role name
    pub role: String,
    /// Mount point of the auth method
    pub auth_mount: String,
    /// File holding the workload identity JWT
    pub identity_token_path: PathBuf,
}

impl RoleConfig {
    /// Role on the default Kubernetes mount.
    #[must_use]
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            auth_mount: "kubernetes".to_string(),
            identity_token_path: PathBuf::from(DEFAULT_IDENTITY_TOKEN_PATH),
        }
    }

    /// Use a different auth mount.
    #[must_use]
    pub fn with_auth_mount(mut self, mount: impl Into<String>) -> Self {
        self.auth_mount = mount.into();
        self
    }

    /// Read the identity token from a different file.
    #[must_use]
    pub fn with_identity_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_token_path = path.into();
        self
    }

    /// API path of the login endpoint.
    #[must_use]
    pub fn login_path(&self) -> String {
        format!("auth/{}/login", self.auth_mount.trim_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_url_joins_cleanly() {
        let config = StoreConfig::new(Url::parse("https://vault.vault.svc:8200/").unwrap());
        assert_eq!(
            config.api_url("/secret/data/app"),
            "https://vault.vault.svc:8200/v1/secret/data/app"
        );
    }

    #[test]
    fn test_http_config_inherits_timeout_and_ca() {
        let config = StoreConfig::new(Url::parse("https://vault:8200").unwrap())
            .with_timeout(Duration::from_secs(3))
            .with_ca_cert("/etc/vault/ca.pem");
        let http = config.http_config();

        assert_eq!(http.timeout, Duration::from_secs(3));
        assert_eq!(http.connect_timeout, Duration::from_secs(3));
        assert!(http.ca_cert_path.is_some());
    }

    #[test]
    fn test_role_defaults() {
        let role = RoleConfig::new("app");
        assert_eq!(role.login_path(), "auth/kubernetes/login");
        assert_eq!(role.identity_token_path, PathBuf::from(DEFAULT_IDENTITY_TOKEN_PATH));

        let role = role.with_auth_mount("/k8s-east/");
        assert_eq!(role.login_path(), "auth/k8s-east/login");
    }
}
