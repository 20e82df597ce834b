//! The `[service]` section: what the `launch`, `probe` and `locate` commands
//! supervise.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::liveness::plugin::PluginConfig;
use crate::liveness::{DetectorConfig, DetectorKind};
use crate::process::{ShellLocatorScript, DEFAULT_PID_LIMIT};
use crate::tail::service_log_pattern;

/// One `[[service.detectors]]` entry: a kind plus its plugin keys.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DetectorEntry {
    pub kind: DetectorKind,
    #[serde(flatten)]
    pub settings: PluginConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Directory the service runs in; relative detector paths resolve here.
    pub working_dir: PathBuf,
    /// Where `<name>.out` and `<name>.err` are written. Defaults to
    /// `<working_dir>/logs`.
    pub logs_dir: Option<PathBuf>,
    /// Whole-name pattern of the files to tail. Defaults to `<name>\.(out|err)`.
    pub log_pattern: Option<String>,
    pub tailer_interval_secs: u64,
    pub post_launch_wait_ms: u64,
    pub start_detection_timeout_secs: u64,
    pub start_detection_interval_secs: u64,
    pub pids_limit: usize,
    pub detectors: Vec<DetectorEntry>,
    pub locator: Option<PluginConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "service".into(),
            working_dir: PathBuf::from("."),
            logs_dir: None,
            log_pattern: None,
            tailer_interval_secs: 5,
            post_launch_wait_ms: 2000,
            start_detection_timeout_secs: 90,
            start_detection_interval_secs: 1,
            pids_limit: DEFAULT_PID_LIMIT,
            detectors: Vec::new(),
            locator: None,
        }
    }
}

impl ServiceConfig {
    pub fn logs_dir(&self) -> PathBuf {
        match &self.logs_dir {
            Some(dir) => resolve(&self.working_dir, dir),
            None => self.working_dir.join("logs"),
        }
    }

    pub fn log_pattern(&self) -> String {
        self.log_pattern
            .clone()
            .unwrap_or_else(|| service_log_pattern(&self.name))
    }

    pub fn tailer_interval(&self) -> Duration {
        Duration::from_secs(self.tailer_interval_secs)
    }

    pub fn post_launch_wait(&self) -> Duration {
        Duration::from_millis(self.post_launch_wait_ms)
    }

    pub fn start_detection_timeout(&self) -> Duration {
        Duration::from_secs(self.start_detection_timeout_secs)
    }

    pub fn start_detection_interval(&self) -> Duration {
        Duration::from_secs(self.start_detection_interval_secs)
    }

    /// Typed detector configs, in declaration order.
    pub fn detector_configs(&self) -> Result<Vec<DetectorConfig>, ConfigError> {
        self.detectors
            .iter()
            .map(|entry| DetectorConfig::from_plugin(entry.kind, &entry.settings, &self.working_dir))
            .collect()
    }

    /// Script for the delegating locator, if one is configured.
    pub fn locator_script(&self) -> Result<Option<ShellLocatorScript>, ConfigError> {
        let Some(plugin) = &self.locator else {
            return Ok(None);
        };
        let mut script = ShellLocatorScript::from_plugin(plugin)?;
        let dir = match script.working_dir.take() {
            Some(dir) => resolve(&self.working_dir, &dir),
            None => self.working_dir.clone(),
        };
        script.working_dir = Some(dir);
        Ok(Some(script))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField { field: "service.name" });
        }
        if self.tailer_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "tailer_interval_secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.start_detection_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "start_detection_interval_secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.pids_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pids_limit",
                reason: "must be greater than 0".to_string(),
            });
        }
        regex::Regex::new(&self.log_pattern()).map_err(|e| ConfigError::InvalidValue {
            field: "log_pattern",
            reason: e.to_string(),
        })?;
        self.detector_configs()?;
        self.locator_script()?;
        Ok(())
    }
}

/// Resolve `path` against `base` unless it is absolute.
pub(crate) fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
