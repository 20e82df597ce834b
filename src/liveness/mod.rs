//! Liveness detectors: is the launched service ready yet?
//!
//! Each detector is built from a typed config that is validated when the
//! configuration is loaded, so a missing `Port` or a broken regex fails
//! before any polling starts.
//!
//! | Kind   | Alive when                                         |
//! |--------|----------------------------------------------------|
//! | `port` | every configured TCP port accepts a connection     |
//! | `http` | a GET answers with an accepted status code         |
//! | `file` | a line matching a regex shows up in a tailed file  |

mod file;
mod http;
pub mod plugin;
mod port;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use plugin::PluginConfig;

pub use file::{FileDetectorConfig, FileLivenessDetector};
pub use http::{HttpDetectorConfig, HttpLivenessDetector};
pub use port::{PortDetectorConfig, PortLivenessDetector, DEFAULT_HOST};

/// Readiness check for a launched service.
#[async_trait]
pub trait LivenessDetector: Send + Sync {
    /// Short kind label used in logs and tables.
    fn name(&self) -> &'static str;

    /// `Ok(false)` means "not yet"; errors are terminal.
    async fn is_alive(&self) -> Result<bool>;

    /// Runs before the service command is spawned.
    async fn before_launch(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Port,
    Http,
    File,
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DetectorKind::Port => "port",
            DetectorKind::Http => "http",
            DetectorKind::File => "file",
        })
    }
}

impl FromStr for DetectorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "port" => Ok(DetectorKind::Port),
            "http" => Ok(DetectorKind::Http),
            "file" => Ok(DetectorKind::File),
            other => Err(ConfigError::InvalidValue {
                field: "kind",
                reason: format!("unknown detector kind `{other}` (expected port, http or file)"),
            }),
        }
    }
}

/// Validated configuration for one detector.
#[derive(Debug, Clone)]
pub enum DetectorConfig {
    Port(PortDetectorConfig),
    Http(HttpDetectorConfig),
    File(FileDetectorConfig),
}

impl DetectorConfig {
    /// Validate a plugin map for `kind`. Relative file paths resolve
    /// against `service_dir`.
    pub fn from_plugin(
        kind: DetectorKind,
        plugin: &PluginConfig,
        service_dir: &Path,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(match kind {
            DetectorKind::Port => DetectorConfig::Port(PortDetectorConfig::from_plugin(plugin)?),
            DetectorKind::Http => DetectorConfig::Http(HttpDetectorConfig::from_plugin(plugin)?),
            DetectorKind::File => {
                DetectorConfig::File(FileDetectorConfig::from_plugin(plugin, service_dir)?)
            }
        })
    }

    pub fn kind(&self) -> DetectorKind {
        match self {
            DetectorConfig::Port(_) => DetectorKind::Port,
            DetectorConfig::Http(_) => DetectorKind::Http,
            DetectorConfig::File(_) => DetectorKind::File,
        }
    }

    /// Human-readable target, e.g. `127.0.0.1:8080,8081`.
    pub fn target(&self) -> String {
        match self {
            DetectorConfig::Port(c) => {
                let ports: Vec<String> = c.ports.iter().map(u16::to_string).collect();
                format!("{}:{}", c.host, ports.join(","))
            }
            DetectorConfig::Http(c) => c.url.to_string(),
            DetectorConfig::File(c) => format!("{} =~ /{}/", c.path.display(), c.pattern),
        }
    }

    pub fn build(&self) -> Result<Box<dyn LivenessDetector>> {
        Ok(match self {
            DetectorConfig::Port(c) => Box::new(PortLivenessDetector::new(c.clone())),
            DetectorConfig::Http(c) => Box::new(HttpLivenessDetector::new(c.clone())?),
            DetectorConfig::File(c) => Box::new(FileLivenessDetector::new(c.clone())),
        })
    }
}
