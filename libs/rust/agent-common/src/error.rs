//! Centralized error types for the shared library.
//!
//! Errors raised while wiring up infrastructure: HTTP clients, TLS roots
//! and the tracing subscriber. None of them are retried.

use thiserror::Error;

/// Common error type for platform operations.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// HTTP client construction or request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local I/O failed
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Tracing subscriber could not be installed
    #[error("Tracing initialization failed: {0}")]
    Tracing(String),
}

impl PlatformError {
    /// Create an I/O error for the given path.
    #[must_use]
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid input error with the given message.
    ///
    /// # Examples
    ///
    /// ```
    /// use agent_common::PlatformError;
    ///
    /// let err = PlatformError::invalid_input("bad pem");
    /// assert_eq!(err.to_string(), "Invalid input: bad pem");
    /// ```
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}
