//! Remote admin API port.
//!
//! The topology inspectors only see the [`AdminClient`] trait; the REST
//! implementation lives in [`rest`]. A missing resource is reported as
//! [`AdminError::NotFound`] so callers can treat it as "not there yet".

pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rest::RestAdminClient;

/// Aggregate lifecycle state of an application or service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    /// The admin API does not know the resource (yet).
    NotFound,
    /// Deployment is in progress.
    #[serde(alias = "IN_PROGRESS")]
    Installing,
    /// Every instance reported as started.
    Started,
    /// Terminal failure.
    Failed,
}

impl DeploymentState {
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, DeploymentState::Failed)
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeploymentState::NotFound => "not found",
            DeploymentState::Installing => "installing",
            DeploymentState::Started => "started",
            DeploymentState::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescription {
    pub service_name: String,
    #[serde(default)]
    pub application_name: String,
    #[serde(default)]
    pub deployment_id: String,
    #[serde(default)]
    pub instance_count: u32,
    #[serde(default)]
    pub planned_instances: u32,
    #[serde(default = "default_state")]
    pub service_state: DeploymentState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDescription {
    pub application_name: String,
    #[serde(rename = "applicationState")]
    pub state: DeploymentState,
    #[serde(rename = "servicesDescription", default)]
    pub services: Vec<ServiceDescription>,
}

/// One entry of a deployment's lifecycle event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    pub index: u64,
    pub description: String,
}

fn default_state() -> DeploymentState {
    DeploymentState::Installing
}

/// Errors from the admin API.
#[derive(Error, Debug)]
pub enum AdminError {
    #[error("{resource} could not be found")]
    NotFound {
        resource: String,
        message_id: Option<String>,
    },

    #[error("admin API returned {status}: {message}")]
    Status {
        status: u16,
        message: String,
        message_id: Option<String>,
    },

    #[error("admin API request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode admin API response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("invalid admin API url: {0}")]
    Url(#[from] url::ParseError),
}

impl AdminError {
    /// A missing resource is a transient condition for pollers.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AdminError::NotFound { .. })
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AdminError::NotFound {
            resource: resource.into(),
            message_id: None,
        }
    }
}

/// Read-only view of the remote admin API used by the topology inspectors.
#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn application_description(
        &self,
        application: &str,
    ) -> Result<ApplicationDescription, AdminError>;

    async fn service_description(
        &self,
        application: &str,
        service: &str,
    ) -> Result<ServiceDescription, AdminError>;

    /// Every service currently deployed under `deployment_id`.
    async fn service_descriptions(
        &self,
        deployment_id: &str,
    ) -> Result<Vec<ServiceDescription>, AdminError>;

    /// Events with index in `from..=to`; `to = None` means everything after `from`.
    async fn deployment_events(
        &self,
        deployment_id: &str,
        from: u64,
        to: Option<u64>,
    ) -> Result<Vec<DeploymentEvent>, AdminError>;

    async fn last_event(&self, deployment_id: &str)
        -> Result<Option<DeploymentEvent>, AdminError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_description_decodes_remote_names() {
        let json = r#"{
            "applicationName": "petclinic",
            "applicationState": "IN_PROGRESS",
            "servicesDescription": [
                {"serviceName": "mongod", "instanceCount": 1, "plannedInstances": 2,
                 "deploymentId": "dep-1", "serviceState": "STARTED"}
            ]
        }"#;

        let description: ApplicationDescription = serde_json::from_str(json).unwrap();

        assert_eq!(description.state, DeploymentState::Installing);
        assert_eq!(description.services.len(), 1);
        assert_eq!(description.services[0].instance_count, 1);
        assert_eq!(description.services[0].service_state, DeploymentState::Started);
    }

    #[test]
    fn not_found_is_distinguishable() {
        assert!(AdminError::not_found("Application petclinic").is_not_found());
        let other = AdminError::Status {
            status: 500,
            message: "boom".into(),
            message_id: None,
        };
        assert!(!other.is_not_found());
    }
}
