//! Tracing subscriber setup.
//!
//! Installs a global `tracing` subscriber with an `EnvFilter` (so `RUST_LOG`
//! wins over the configured level) and plain or JSON formatting.

use crate::PlatformError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name recorded on every event
    pub service_name: String,
    /// Log level filter
    pub log_level: String,
    /// Whether to output JSON format
    pub json_output: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "secret-agent".to_string(),
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}

impl TracingConfig {
    /// Set the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the log level filter.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Enable or disable JSON output.
    #[must_use]
    pub const fn with_json_output(mut self, json: bool) -> Self {
        self.json_output = json;
        self
    }

    /// Filter used when `RUST_LOG` is unset. HTTP internals stay at `warn`
    /// unless asked for explicitly.
    fn default_directives(&self) -> String {
        format!("{},hyper=warn,hyper_util=warn,reqwest=warn", self.log_level)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.default_directives()))
    }
}

/// Initialize tracing with the given configuration.
///
/// Call once at startup. The service name is attached as a field of a root
/// span entered for the lifetime of the process by the caller.
///
/// # Errors
///
/// Returns [`PlatformError::Tracing`] if a global subscriber is already set.
pub fn init_tracing(config: &TracingConfig) -> Result<(), PlatformError> {
    let registry = tracing_subscriber::registry().with(config.filter());

    let result = if config.json_output {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(false),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    result.map_err(|e| PlatformError::Tracing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.service_name, "secret-agent");
        assert_eq!(config.log_level, "info");
        assert!(!config.json_output);
    }

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::default()
            .with_service_name("db-creds-agent")
            .with_log_level("debug")
            .with_json_output(true);

        assert_eq!(config.service_name, "db-creds-agent");
        assert_eq!(config.log_level, "debug");
        assert!(config.json_output);
    }

    #[test]
    fn test_http_crates_quieted_by_default() {
        let config = TracingConfig::default().with_log_level("debug");
        assert_eq!(
            config.default_directives(),
            "debug,hyper=warn,hyper_util=warn,reqwest=warn"
        );
    }

    #[test]
    fn test_second_init_fails() {
        let config = TracingConfig::default().with_log_level("warn");
        let first = init_tracing(&config);
        let second = init_tracing(&config);

        // Another test in this binary may have installed a subscriber first.
        assert!(first.is_ok() || matches!(first, Err(PlatformError::Tracing(_))));
        assert!(matches!(second, Err(PlatformError::Tracing(_))));
    }
}
