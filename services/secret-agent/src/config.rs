//! Type-Safe Configuration with Validation
//!
//! Settings are layered: an optional file named by `SECRET_AGENT_CONFIG`,
//! then `SECRET_AGENT_*` environment variables (a `.env` file is honoured).
//! Everything is validated once at startup; a bad value is fatal.

use agent_common::{BackoffConfig, TracingConfig};
use config::{Environment, File};
use secret_store_client::{LeaseTracker, RenewalPolicy, RoleConfig, StoreConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable naming the optional configuration file.
pub const CONFIG_FILE_ENV: &str = "SECRET_AGENT_CONFIG";

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "SECRET_AGENT";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration sources could not be read or merged
    #[error("Failed to load configuration: {0}")]
    Load(String),

    /// Missing required field
    #[error("Missing required configuration: {0}")]
    MissingRequired(&'static str),

    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Offending option
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// A value is outside its allowed range
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Offending option
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

/// Raw settings as read from file and environment.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    store_addr: Option<String>,
    role: Option<String>,
    secret_path: Option<String>,
    output_path: Option<String>,
    safety_margin_seconds: u64,
    max_backoff_seconds: u64,
    initial_backoff_millis: u64,
    max_retries: u32,
    renew_fraction: f64,
    static_refresh_seconds: u64,
    auth_mount: String,
    identity_token_path: String,
    request_timeout_seconds: u64,
    ca_cert_path: Option<String>,
    file_mode: String,
    remove_on_shutdown: bool,
    revoke_on_shutdown: bool,
    shutdown_grace_seconds: u64,
    log_level: String,
    log_json: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            store_addr: None,
            role: None,
            secret_path: None,
            output_path: None,
            safety_margin_seconds: 60,
            max_backoff_seconds: 300,
            initial_backoff_millis: 500,
            max_retries: 5,
            renew_fraction: secret_store_client::lease::DEFAULT_RENEW_FRACTION,
            static_refresh_seconds: 300,
            auth_mount: "kubernetes".to_string(),
            identity_token_path: secret_store_client::config::DEFAULT_IDENTITY_TOKEN_PATH
                .to_string(),
            request_timeout_seconds: 10,
            ca_cert_path: None,
            file_mode: "0600".to_string(),
            remove_on_shutdown: false,
            revoke_on_shutdown: false,
            shutdown_grace_seconds: 5,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

/// Agent configuration with validation.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Credential store address
    pub store_addr: Url,
    /// Auth role name
    pub role: String,
    /// Secret to fetch, e.g. `database/creds/app`
    pub secret_path: String,
    /// File the secret is published to
    pub output_path: PathBuf,
    /// Distance kept from hard lease expiry
    pub safety_margin: Duration,
    /// Backoff cap
    pub max_backoff: Duration,
    /// First backoff delay
    pub initial_backoff: Duration,
    /// Attempts per wake cycle before pausing for the backoff cap
    pub max_retries: u32,
    /// Share of a lease TTL that may elapse before renewal
    pub renew_fraction: f64,
    /// Refresh interval for secrets without a lease
    pub static_refresh: Duration,
    /// Auth method mount
    pub auth_mount: String,
    /// Workload identity token file
    pub identity_token_path: PathBuf,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Extra CA bundle for the store
    pub ca_cert_path: Option<PathBuf>,
    /// Permission bits of the published file
    pub file_mode: u32,
    /// Delete the published file on shutdown
    pub remove_on_shutdown: bool,
    /// Revoke the current lease on shutdown
    pub revoke_on_shutdown: bool,
    /// Time the renewal loop gets to stop before it is aborted
    pub shutdown_grace: Duration,
    /// Log filter
    pub log_level: String,
    /// Emit JSON logs
    pub log_json: bool,
}

impl AgentConfig {
    /// Configuration with the required options and defaults for the rest.
    #[must_use]
    pub fn new(
        store_addr: Url,
        role: impl Into<String>,
        secret_path: impl Into<String>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        let raw = RawConfig::default();
        Self {
            store_addr,
            role: role.into(),
            secret_path: secret_path.into(),
            output_path: output_path.into(),
            safety_margin: Duration::from_secs(raw.safety_margin_seconds),
            max_backoff: Duration::from_secs(raw.max_backoff_seconds),
            initial_backoff: Duration::from_millis(raw.initial_backoff_millis),
            max_retries: raw.max_retries,
            renew_fraction: raw.renew_fraction,
            static_refresh: Duration::from_secs(raw.static_refresh_seconds),
            auth_mount: raw.auth_mount,
            identity_token_path: PathBuf::from(raw.identity_token_path),
            request_timeout: Duration::from_secs(raw.request_timeout_seconds),
            ca_cert_path: None,
            file_mode: 0o600,
            remove_on_shutdown: raw.remove_on_shutdown,
            revoke_on_shutdown: raw.revoke_on_shutdown,
            shutdown_grace: Duration::from_secs(raw.shutdown_grace_seconds),
            log_level: raw.log_level,
            log_json: raw.log_json,
        }
    }

    /// Loads configuration from the process environment with validation.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unreadable sources, missing required
    /// options or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::from_sources(file.as_deref(), None)
    }

    /// Loads configuration from an optional file and an environment map.
    ///
    /// `env` replaces the process environment when given; keys use the
    /// `SECRET_AGENT_` prefix.
    ///
    /// # Errors
    ///
    /// See [`AgentConfig::from_env`].
    pub fn from_sources(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }
        let raw: RawConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .and_then(config::Config::try_deserialize::<RawConfig>)
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let config = Self::from_raw(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let addr = required(raw.store_addr, "store_addr")?;
        let store_addr = Url::parse(&addr).map_err(|e| ConfigError::InvalidUrl {
            field: "store_addr",
            reason: e.to_string(),
        })?;

        Ok(Self {
            store_addr,
            role: required(raw.role, "role")?,
            secret_path: required(raw.secret_path, "secret_path")?,
            output_path: PathBuf::from(required(raw.output_path, "output_path")?),
            safety_margin: Duration::from_secs(raw.safety_margin_seconds),
            max_backoff: Duration::from_secs(raw.max_backoff_seconds),
            initial_backoff: Duration::from_millis(raw.initial_backoff_millis),
            max_retries: raw.max_retries,
            renew_fraction: raw.renew_fraction,
            static_refresh: Duration::from_secs(raw.static_refresh_seconds),
            auth_mount: raw.auth_mount,
            identity_token_path: PathBuf::from(raw.identity_token_path),
            request_timeout: Duration::from_secs(raw.request_timeout_seconds),
            ca_cert_path: raw.ca_cert_path.filter(|p| !p.trim().is_empty()).map(PathBuf::from),
            file_mode: parse_mode(&raw.file_mode)?,
            remove_on_shutdown: raw.remove_on_shutdown,
            revoke_on_shutdown: raw.revoke_on_shutdown,
            shutdown_grace: Duration::from_secs(raw.shutdown_grace_seconds),
            log_level: raw.log_level,
            log_json: raw.log_json,
        })
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.store_addr.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                field: "store_addr",
                reason: format!("unsupported scheme {}", self.store_addr.scheme()),
            });
        }
        if self.role.trim().is_empty() {
            return Err(ConfigError::MissingRequired("role"));
        }
        if self.secret_path.trim_matches('/').is_empty() {
            return Err(ConfigError::MissingRequired("secret_path"));
        }
        if self.output_path.file_name().is_none() {
            return Err(ConfigError::invalid("output_path", "must name a file"));
        }
        if self.safety_margin.is_zero() {
            return Err(ConfigError::invalid("safety_margin_seconds", "must be at least 1"));
        }
        if self.max_backoff.is_zero() {
            return Err(ConfigError::invalid("max_backoff_seconds", "must be at least 1"));
        }
        if self.initial_backoff.is_zero() || self.initial_backoff > self.max_backoff {
            return Err(ConfigError::invalid(
                "initial_backoff_millis",
                "must be positive and not above max_backoff_seconds",
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries", "must be at least 1"));
        }
        if !(self.renew_fraction > 0.0 && self.renew_fraction < 1.0) {
            return Err(ConfigError::invalid("renew_fraction", "must be between 0 and 1"));
        }
        if self.static_refresh.is_zero() {
            return Err(ConfigError::invalid("static_refresh_seconds", "must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::invalid("request_timeout_seconds", "must be at least 1"));
        }
        if self.auth_mount.trim_matches('/').is_empty() {
            return Err(ConfigError::MissingRequired("auth_mount"));
        }
        Ok(())
    }

    /// Store connection settings.
    #[must_use]
    pub fn store_config(&self) -> StoreConfig {
        let mut store = StoreConfig::new(self.store_addr.clone()).with_timeout(self.request_timeout);
        if let Some(path) = &self.ca_cert_path {
            store = store.with_ca_cert(path);
        }
        store
    }

    /// Login role settings.
    #[must_use]
    pub fn role_config(&self) -> RoleConfig {
        RoleConfig::new(&self.role)
            .with_auth_mount(&self.auth_mount)
            .with_identity_token_path(&self.identity_token_path)
    }

    /// Lease tracker built from the renewal options.
    #[must_use]
    pub fn lease_tracker(&self) -> LeaseTracker {
        LeaseTracker::new(RenewalPolicy::new(
            self.renew_fraction,
            self.safety_margin,
            self.static_refresh,
        ))
    }

    /// Retry backoff settings.
    #[must_use]
    pub fn backoff_config(&self) -> BackoffConfig {
        BackoffConfig::default()
            .with_initial_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_retries(self.max_retries)
    }

    /// Logging settings.
    #[must_use]
    pub fn tracing_config(&self) -> TracingConfig {
        TracingConfig::default()
            .with_log_level(&self.log_level)
            .with_json_output(self.log_json)
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingRequired(field))
}

/// Parse permission bits written in octal, with or without a `0`/`0o` prefix.
fn parse_mode(raw: &str) -> Result<u32, ConfigError> {
    let digits = raw.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    let mode = u32::from_str_radix(digits, 8)
        .map_err(|e| ConfigError::invalid("file_mode", e.to_string()))?;
    if mode > 0o777 {
        return Err(ConfigError::invalid("file_mode", "must be at most 0777"));
    }
    if mode & 0o600 != 0o600 {
        return Err(ConfigError::invalid("file_mode", "owner must be able to read and write"));
    }
    Ok(mode)
}
