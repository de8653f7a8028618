//! Shared library for cross-cutting concerns in the secret agent.
//!
//! This crate provides centralized implementations for:
//! - Error types with retryability classification
//! - HTTP client configuration and building (rustls, custom CA bundles)
//! - Exponential backoff with a cap and jitter
//! - Tracing subscriber initialization

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backoff;
pub mod error;
pub mod http;
pub mod tracing_config;

pub use backoff::{BackoffConfig, BackoffPolicy};
pub use error::PlatformError;
pub use http::{HttpConfig, build_http_client};
pub use tracing_config::{TracingConfig, init_tracing};
