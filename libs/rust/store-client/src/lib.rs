//! Credential store client for the secret agent.
//!
//! Speaks the Vault HTTP API dialect: Kubernetes login, secret reads, token
//! self-renewal and lease renewal/revocation. Also owns the data model shared
//! with the agent (credentials, leases, auth tokens) and the pure lease
//! tracker that decides when a lease has to be renewed or refetched.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error;
pub mod lease;
pub mod model;
pub mod provider;
pub mod secrets;

pub use client::StoreClient;
pub use config::{RoleConfig, StoreConfig};
pub use error::{AuthError, FetchError};
pub use lease::{LeaseTracker, RenewalPlan, RenewalPolicy};
pub use model::{AuthToken, Credential, Lease};
pub use provider::CredentialSource;
