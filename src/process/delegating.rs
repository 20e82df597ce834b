//! Locator that asks an external script for the service's PIDs.

use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;
use tracing::{debug, info};

use super::provider::Pid;
use super::ProcessLocator;
use crate::error::{ConfigError, Error, Result};
use crate::liveness::plugin::{PluginConfig, COMMAND_KEY, WORKING_DIRECTORY_KEY};

/// Something that produces a raw PID list.
pub trait LocatorScript: Send {
    fn run(&self) -> Result<Value>;
}

/// Runs a command through `sh -c` and returns its standard output.
///
/// Output that parses as a JSON array is returned as that array; anything
/// else is returned as a trimmed string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellLocatorScript {
    pub command: String,
    pub working_dir: Option<PathBuf>,
}

impl ShellLocatorScript {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            working_dir: None,
        }
    }

    /// Build from plugin keys `Command` (required) and `WorkingDirectory`.
    pub fn from_plugin(config: &PluginConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            command: config.required_string(COMMAND_KEY)?,
            working_dir: config.optional_string(WORKING_DIRECTORY_KEY)?.map(PathBuf::from),
        })
    }
}

impl LocatorScript for ShellLocatorScript {
    fn run(&self) -> Result<Value> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(&self.command);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(command = %self.command, "Running process locator script");
        let output = command.output()?;
        if !output.status.success() {
            return Err(Error::Process {
                pid: None,
                reason: format!(
                    "locator script `{}` failed with {}: {}",
                    self.command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(match serde_json::from_str::<Value>(&stdout) {
            Ok(array @ Value::Array(_)) => array,
            _ => Value::String(stdout),
        })
    }
}

/// Locator delegating to a [`LocatorScript`].
pub struct DelegatingProcessLocator<S = ShellLocatorScript> {
    script: S,
}

impl<S: LocatorScript> DelegatingProcessLocator<S> {
    pub fn new(script: S) -> Self {
        Self { script }
    }
}

impl<S: LocatorScript> ProcessLocator for DelegatingProcessLocator<S> {
    fn locate(&mut self) -> Result<Vec<Pid>> {
        let raw = self.script.run()?;
        let pids = parse_pid_list(&raw)?;
        info!(pids = ?pids, "Locator script reported service processes");
        Ok(pids)
    }
}

/// Parse a locator result into PIDs.
///
/// Accepts an array of integers or numeric strings, or a string of
/// comma-separated PIDs optionally wrapped in `[...]`. Empty input yields an
/// empty list.
pub fn parse_pid_list(raw: &Value) -> std::result::Result<Vec<Pid>, ConfigError> {
    match raw {
        Value::Array(items) => items.iter().map(parse_pid_value).collect(),
        Value::String(text) => parse_pid_string(text),
        Value::Null => Ok(Vec::new()),
        Value::Number(_) => parse_pid_value(raw).map(|pid| vec![pid]),
        other => Err(invalid(format!("unsupported locator result: {other}"))),
    }
}

fn parse_pid_string(text: &str) -> std::result::Result<Vec<Pid>, ConfigError> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| parse_pid_str(part.trim()))
        .collect()
}

fn parse_pid_value(value: &Value) -> std::result::Result<Pid, ConfigError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| Pid::try_from(n).ok())
            .ok_or_else(|| invalid(format!("{n} is not a valid process ID"))),
        Value::String(s) => parse_pid_str(s.trim()),
        other => Err(invalid(format!("{other} is not a valid process ID"))),
    }
}

fn parse_pid_str(text: &str) -> std::result::Result<Pid, ConfigError> {
    text.parse::<Pid>()
        .map_err(|_| invalid(format!("`{text}` is not a valid process ID")))
}

fn invalid(reason: String) -> ConfigError {
    ConfigError::InvalidValue {
        field: "locator result",
        reason,
    }
}
