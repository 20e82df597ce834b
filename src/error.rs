use thiserror::Error;

use crate::admin::AdminError;
use crate::process::Pid;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Admin(#[from] AdminError),

    /// A poll latch deadline passed before its predicate was done.
    #[error("{message}")]
    Timeout { message: String },

    /// The remote deployment reached a terminal failed state.
    #[error("failed to deploy {name}: the deployment is in a FAILED state")]
    DeploymentFailed { name: String },

    #[error("number of running instances ({actual}) exceeded the planned number of {planned}")]
    InstancesExceeded { planned: u32, actual: u32 },

    #[error("port {port} on {host} is in use before the process was launched")]
    PortInUse { host: String, port: u16 },

    #[error("the launched process exited with the error exit code {code}; consult the logs for more details")]
    LaunchFailed { code: i32 },

    #[error("process query failed{}: {reason}", pid_suffix(.pid))]
    Process { pid: Option<Pid>, reason: String },

    #[error("number of process IDs found for the service ({found}) exceeded the limit of {limit}")]
    PidLimitExceeded { found: usize, limit: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;

fn pid_suffix(pid: &Option<Pid>) -> String {
    pid.map(|p| format!(" for pid {p}")).unwrap_or_default()
}

impl Error {
    /// Build a process query error for a specific PID.
    pub fn process(pid: Pid, reason: impl Into<String>) -> Self {
        Error::Process {
            pid: Some(pid),
            reason: reason.into(),
        }
    }

    /// Check whether this error is a poll latch timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        // dialoguer::Error wraps an IO error
        Error::Io(std::io::Error::other(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_displays_caller_message() {
        let err = Error::Timeout {
            message: "Application installation timed out.".to_string(),
        };
        assert_eq!(err.to_string(), "Application installation timed out.");
        assert!(err.is_timeout());
    }

    #[test]
    fn process_error_mentions_pid_when_known() {
        assert_eq!(
            Error::process(42, "no such process").to_string(),
            "process query failed for pid 42: no such process"
        );
        let err = Error::Process {
            pid: None,
            reason: "listing failed".to_string(),
        };
        assert_eq!(err.to_string(), "process query failed: listing failed");
    }
}
