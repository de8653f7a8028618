//! Agent error types.
//!
//! Store failures come from the client crate; this module adds the local
//! publishing failures and a top-level error for the binary.

use crate::config::ConfigError;
use agent_common::PlatformError;
use secret_store_client::{AuthError, FetchError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure to write the secret file.
#[derive(Error, Debug)]
pub enum PublishError {
    /// Credential could not be serialized
    #[error("Failed to serialize credential: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Filesystem operation failed
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Publisher was shut down by removing its file
    #[error("Publisher for {} has been retired", path.display())]
    Retired {
        /// Target that was removed
        path: PathBuf,
    },

    /// Existing file is not a published credential
    #[error("Unrecognised content in {}", path.display())]
    Malformed {
        /// File that was read
        path: PathBuf,
    },
}

impl PublishError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Top-level agent error.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Infrastructure setup failed
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Authentication failed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Secret could not be read or renewed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Secret could not be written
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// Background task failed
    #[error("Task error: {0}")]
    Task(String),
}
