use std::collections::BTreeMap;

use crate::admin::{AdminClient, AdminError};
use crate::error::Result;

use super::Topology;

/// Snapshot an installed application before uninstalling it.
///
/// `planned` and `current` both start from the live instance counts, the
/// deployment id comes from the first service and the event cursor is placed
/// after the last existing event so only uninstall events get reported.
pub async fn prepare_application_uninstall(
    client: &dyn AdminClient,
    application: &str,
) -> Result<Topology> {
    let description = client
        .application_description(application)
        .await
        .map_err(|e| rename_not_found(e, format!("Application {application}")))?;

    let counts: BTreeMap<String, u32> = description
        .services
        .iter()
        .map(|s| (s.service_name.clone(), s.instance_count))
        .collect();
    let deployment_id = description
        .services
        .first()
        .map(|s| s.deployment_id.clone())
        .unwrap_or_default();

    snapshot(client, application, deployment_id, counts).await
}

/// Snapshot one installed service before uninstalling it.
pub async fn prepare_service_uninstall(
    client: &dyn AdminClient,
    application: &str,
    service: &str,
) -> Result<Topology> {
    let description = client
        .service_description(application, service)
        .await
        .map_err(|e| rename_not_found(e, format!("Service {service} of application {application}")))?;

    let counts = BTreeMap::from([(description.service_name.clone(), description.instance_count)]);
    snapshot(client, application, description.deployment_id, counts).await
}

async fn snapshot(
    client: &dyn AdminClient,
    application: &str,
    deployment_id: String,
    counts: BTreeMap<String, u32>,
) -> Result<Topology> {
    let last_event_index = if deployment_id.is_empty() {
        None
    } else {
        match client.last_event(&deployment_id).await {
            Ok(last) => last.map(|event| event.index),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        }
    };

    Ok(Topology {
        application: application.to_string(),
        deployment_id,
        planned: counts.clone(),
        current: counts,
        last_event_index,
    })
}

fn rename_not_found(err: AdminError, resource: String) -> AdminError {
    match err {
        AdminError::NotFound { message_id, .. } => AdminError::NotFound {
            resource,
            message_id,
        },
        other => other,
    }
}
