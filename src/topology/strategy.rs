use async_trait::async_trait;
use tracing::debug;

use super::Topology;
use crate::admin::{AdminClient, AdminError, DeploymentState};
use crate::error::{Error, Result};

/// Which way instance counts are expected to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Install,
    Uninstall,
}

/// Completion criterion plugged into a [`LifecycleWatcher`](super::LifecycleWatcher).
#[async_trait]
pub trait CompletionStrategy: Send + Sync {
    /// Whether the remote deployment reached the target state.
    async fn is_complete(&self, client: &dyn AdminClient, topology: &Topology) -> Result<bool>;

    /// Live instance count for `service`; a missing service counts as 0.
    async fn current_instance_count(
        &self,
        client: &dyn AdminClient,
        topology: &Topology,
        service: &str,
    ) -> Result<u32> {
        instance_count_or_zero(client, &topology.application, service).await
    }

    fn direction(&self) -> Direction;

    /// Message carried by the timeout error.
    fn timeout_message(&self) -> &str;
}

pub const APPLICATION_INSTALL_TIMEOUT: &str =
    "Application installation timed out. Configure the timeout using the -timeout flag.";
pub const SERVICE_INSTALL_TIMEOUT: &str =
    "Service installation timed out. Configure the timeout using the -timeout flag.";
pub const APPLICATION_UNINSTALL_TIMEOUT: &str =
    "Application uninstall timed out. Configure the timeout using the -timeout flag.";
pub const SERVICE_UNINSTALL_TIMEOUT: &str =
    "Service uninstall timed out. Configure the timeout using the -timeout flag.";

/// Instance count of `service`, or 0 while the admin API does not know it.
pub async fn instance_count_or_zero(
    client: &dyn AdminClient,
    application: &str,
    service: &str,
) -> Result<u32> {
    match client.service_description(application, service).await {
        Ok(description) => Ok(description.instance_count),
        Err(e) if e.is_not_found() => {
            debug!(application, service, "Service not found yet, counting 0 instances");
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

/// Complete once the application is `Started` with every planned service.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplicationInstall;

#[async_trait]
impl CompletionStrategy for ApplicationInstall {
    async fn is_complete(&self, client: &dyn AdminClient, topology: &Topology) -> Result<bool> {
        let description = match client.application_description(&topology.application).await {
            Ok(description) => description,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        match description.state {
            DeploymentState::Failed => Err(Error::DeploymentFailed {
                name: topology.application.clone(),
            }),
            DeploymentState::Started => Ok(description.services.len() == topology.planned.len()),
            DeploymentState::Installing | DeploymentState::NotFound => Ok(false),
        }
    }

    fn direction(&self) -> Direction {
        Direction::Install
    }

    fn timeout_message(&self) -> &str {
        APPLICATION_INSTALL_TIMEOUT
    }
}

/// Complete once one service is `Started`.
#[derive(Debug, Clone)]
pub struct ServiceInstall {
    pub service: String,
}

impl ServiceInstall {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[async_trait]
impl CompletionStrategy for ServiceInstall {
    async fn is_complete(&self, client: &dyn AdminClient, topology: &Topology) -> Result<bool> {
        let description = match client
            .service_description(&topology.application, &self.service)
            .await
        {
            Ok(description) => description,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        match description.service_state {
            DeploymentState::Failed => Err(Error::DeploymentFailed {
                name: self.service.clone(),
            }),
            DeploymentState::Started => Ok(true),
            DeploymentState::Installing | DeploymentState::NotFound => Ok(false),
        }
    }

    fn direction(&self) -> Direction {
        Direction::Install
    }

    fn timeout_message(&self) -> &str {
        SERVICE_INSTALL_TIMEOUT
    }
}

/// Complete once nothing is left under the deployment.
///
/// With `service` set, only that service has to disappear.
#[derive(Debug, Clone, Default)]
pub struct DeploymentUninstall {
    pub service: Option<String>,
}

impl DeploymentUninstall {
    pub fn application() -> Self {
        Self { service: None }
    }

    pub fn service(service: impl Into<String>) -> Self {
        Self {
            service: Some(service.into()),
        }
    }
}

#[async_trait]
impl CompletionStrategy for DeploymentUninstall {
    async fn is_complete(&self, client: &dyn AdminClient, topology: &Topology) -> Result<bool> {
        let services = match client.service_descriptions(&topology.deployment_id).await {
            Ok(services) => services,
            Err(AdminError::NotFound { .. }) => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        Ok(match &self.service {
            None => services.is_empty(),
            Some(name) => !services.iter().any(|s| &s.service_name == name),
        })
    }

    fn direction(&self) -> Direction {
        Direction::Uninstall
    }

    fn timeout_message(&self) -> &str {
        if self.service.is_some() {
            SERVICE_UNINSTALL_TIMEOUT
        } else {
            APPLICATION_UNINSTALL_TIMEOUT
        }
    }
}
