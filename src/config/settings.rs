//! Configuration loading and validation.
//!
//! [`Config`] aggregates every section of `config.toml`. All sections are
//! optional; validation runs eagerly in [`Config::parse_toml`] so detector and
//! locator entries are checked before any command starts polling.
//!
//! # Example
//!
//! ```no_run
//! use deploywatch::config::Config;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.toml")?;
//!     config.logging.init();
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::logging::LoggingConfig;
use super::service::ServiceConfig;
use crate::error::{ConfigError, Result};

/// Connection to the remote admin API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub url: String,
    pub api_version: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8100".into(),
            api_version: "2.0.0".into(),
            username: None,
            password: None,
            request_timeout_secs: 30,
        }
    }
}

/// Timing of deployment waits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_ms: u64,
    /// Application wait budget.
    pub timeout_minutes: u64,
    /// Extra time granted each time the operator chooses to keep waiting.
    pub extend_minutes: u64,
    /// Single-service wait budget.
    pub service_timeout_minutes: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            timeout_minutes: 15,
            extend_minutes: 15,
            service_timeout_minutes: 5,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        minutes(self.timeout_minutes)
    }

    pub fn service_timeout(&self) -> Duration {
        minutes(self.service_timeout_minutes)
    }

    pub fn extension(&self) -> Duration {
        minutes(self.extend_minutes)
    }
}

/// Whole minutes as a duration. Counts past `u64::MAX` seconds saturate.
#[must_use]
pub fn minutes(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60))
}

/// Main configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub admin: AdminConfig,
    pub polling: PollingConfig,
    pub logging: LoggingConfig,
    pub service: ServiceConfig,
}

impl Config {
    /// Parse and validate configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    #[allow(clippy::result_large_err)]
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML is malformed or
    /// validation fails.
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Load `path` if given, else the default config file if it exists, else
    /// defaults.
    #[allow(clippy::result_large_err)]
    pub fn load_or_default(path: Option<&Path>, default_path: Option<&Path>) -> Result<Self> {
        match (path, default_path) {
            (Some(path), _) => Self::load(path),
            (None, Some(path)) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    #[allow(clippy::result_large_err)]
    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.admin.url).map_err(|e| ConfigError::InvalidValue {
            field: "admin.url",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: "admin.url",
                reason: format!("unsupported scheme `{}`", url.scheme()),
            }
            .into());
        }
        if self.admin.api_version.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "admin.api_version",
            }
            .into());
        }
        if self.admin.username.is_some() != self.admin.password.is_some() {
            return Err(ConfigError::InvalidValue {
                field: "admin.username",
                reason: "username and password must be set together".to_string(),
            }
            .into());
        }
        if self.admin.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.polling.interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "interval_ms",
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        self.service.validate()?;
        Ok(())
    }
}
