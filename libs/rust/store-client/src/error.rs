//! Store error types using thiserror 2.0.
//!
//! Messages carry paths, roles and HTTP statuses only. Response bodies are
//! never copied into an error because they may contain secret material.

use thiserror::Error;

/// Failure to obtain or renew the agent's own store token.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Workload identity token could not be read
    #[error("Cannot read identity token {path}: {source}")]
    IdentityToken {
        /// Token file path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Store rejected the role name
    #[error("Invalid role {role} (status {status})")]
    InvalidRole {
        /// Role that was rejected
        role: String,
        /// HTTP status returned by the store
        status: u16,
    },

    /// Store refused the identity or token
    #[error("Login denied (status {0})")]
    Denied(u16),

    /// Store unreachable, timed out or failing
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Response did not have the expected shape
    #[error("Malformed auth response")]
    Malformed,
}

impl AuthError {
    /// Whether the error is an outage rather than a deployment mistake.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Malformed)
    }

    /// Create an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Failure to read, renew or revoke a secret.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Nothing stored at the path
    #[error("Secret not found at path: {0}")]
    NotFound(String),

    /// Policy does not grant access to the path
    #[error("Permission denied for path: {0}")]
    PermissionDenied(String),

    /// Network failure, timeout, throttling or server error
    #[error("Transient store failure: {0}")]
    Transient(String),
}

impl FetchError {
    /// Check if error is retryable without operator intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Create a transient error.
    #[must_use]
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }
}

/// Describe a transport failure without echoing URLs or bodies.
pub(crate) fn describe_transport(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else if err.is_decode() {
        "response body could not be decoded".to_string()
    } else {
        "request failed".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FetchError::PermissionDenied("database/creds/app".to_string());
        assert_eq!(err.to_string(), "Permission denied for path: database/creds/app");

        let err = AuthError::InvalidRole {
            role: "app".to_string(),
            status: 400,
        };
        assert_eq!(err.to_string(), "Invalid role app (status 400)");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(FetchError::transient("status 503").is_retryable());
        assert!(!FetchError::NotFound("path".to_string()).is_retryable());
        assert!(!FetchError::PermissionDenied("path".to_string()).is_retryable());
        assert!(AuthError::unavailable("timeout").is_retryable());
        assert!(!AuthError::Denied(403).is_retryable());
    }

    #[test]
    fn test_deployment_mistakes_not_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(
            !AuthError::IdentityToken {
                path: "/token".to_string(),
                source: io,
            }
            .is_retryable()
        );
        assert!(!AuthError::InvalidRole { role: "app".to_string(), status: 400 }.is_retryable());
        assert!(AuthError::Malformed.is_retryable());
    }
}
