//! Centralized HTTP client configuration and building.
//!
//! Every outbound call to the credential store goes through a client built
//! here, so timeouts and TLS trust are configured in one place.

use crate::PlatformError;
use reqwest::{Certificate, Client, ClientBuilder};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Request timeout (default: 10s)
    pub timeout: Duration,
    /// Connection timeout (default: 5s)
    pub connect_timeout: Duration,
    /// Pool idle timeout (default: 90s)
    pub pool_idle_timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Extra PEM bundle trusted in addition to the webpki roots
    pub ca_cert_path: Option<PathBuf>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: concat!("secret-agent/", env!("CARGO_PKG_VERSION")).to_string(),
            ca_cert_path: None,
        }
    }
}

impl HttpConfig {
    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Trust the certificates in the given PEM bundle.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert_path = Some(path.into());
        self
    }
}

/// Build a configured HTTP client.
///
/// Creates a reqwest client with rustls TLS and the configured timeouts.
/// Certificate verification is always on.
///
/// # Errors
///
/// Returns an error if the CA bundle cannot be read or parsed, or if the
/// client cannot be built.
///
/// # Examples
///
/// ```
/// use agent_common::{HttpConfig, build_http_client};
/// use std::time::Duration;
///
/// let config = HttpConfig::default().with_timeout(Duration::from_secs(3));
/// assert!(build_http_client(&config).is_ok());
/// ```
pub fn build_http_client(config: &HttpConfig) -> Result<Client, PlatformError> {
    let mut builder = ClientBuilder::new()
        .timeout(config.timeout)
        .connect_timeout(config.connect_timeout)
        .pool_idle_timeout(config.pool_idle_timeout)
        .user_agent(&config.user_agent)
        .use_rustls_tls();

    if let Some(path) = &config.ca_cert_path {
        let pem = std::fs::read(path)
            .map_err(|e| PlatformError::io(path.display().to_string(), e))?;
        let certs = Certificate::from_pem_bundle(&pem).map_err(|e| {
            PlatformError::invalid_input(format!("CA bundle {}: {e}", path.display()))
        })?;
        if certs.is_empty() {
            return Err(PlatformError::invalid_input(format!(
                "CA bundle {} contains no certificates",
                path.display()
            )));
        }
        for cert in certs {
            builder = builder.add_root_certificate(cert);
        }
    }

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.user_agent.starts_with("secret-agent/"));
        assert!(config.ca_cert_path.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = HttpConfig::default()
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("test-agent")
            .with_ca_cert("/etc/ssl/store-ca.pem");

        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, "test-agent");
        assert_eq!(
            config.ca_cert_path.as_deref(),
            Some(std::path::Path::new("/etc/ssl/store-ca.pem"))
        );
    }

    #[test]
    fn test_build_client() {
        assert!(build_http_client(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn test_missing_ca_bundle() {
        let config = HttpConfig::default().with_ca_cert("/nonexistent/ca.pem");
        let err = build_http_client(&config).unwrap_err();
        assert!(matches!(err, PlatformError::Io { .. }));
    }

    #[test]
    fn test_ca_bundle_without_certificates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, b"not a certificate\n").unwrap();

        let config = HttpConfig::default().with_ca_cert(&path);
        let err = build_http_client(&config).unwrap_err();
        assert!(matches!(err, PlatformError::InvalidInput(_)));
    }
}
