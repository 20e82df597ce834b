//! HTTP implementation of [`AdminClient`].
//!
//! Every endpoint answers with a JSON envelope
//! `{ "status", "message", "messageId", "verbose", "response" }`. Failed
//! requests still try to decode the envelope so the server's message id can be
//! used to classify missing resources.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{
    AdminClient, AdminError, ApplicationDescription, DeploymentEvent, ServiceDescription,
};
use crate::config::AdminConfig;

const MISSING_RESOURCE_MESSAGE_ID: &str = "missing_resource";
const DEPLOYMENTS_PATH: &str = "deployments";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    verbose: Option<String>,
    response: Option<T>,
}

#[derive(Debug, Deserialize)]
struct EventPage {
    #[serde(default)]
    events: Vec<DeploymentEvent>,
}

/// Admin API client over HTTP.
#[derive(Debug, Clone)]
pub struct RestAdminClient {
    client: reqwest::Client,
    deployments_url: Url,
    credentials: Option<(String, String)>,
}

impl RestAdminClient {
    /// Build a client rooted at `<base>/<api_version>/deployments/`.
    pub fn new(
        base: &str,
        api_version: &str,
        request_timeout: Duration,
    ) -> Result<Self, AdminError> {
        let mut root = Url::parse(base)?;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        let deployments_url = root.join(&format!(
            "{}/{}/",
            api_version.trim_matches('/'),
            DEPLOYMENTS_PATH
        ))?;

        let client = reqwest::Client::builder()
            .user_agent(concat!("deploywatch/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            deployments_url,
            credentials: None,
        })
    }

    /// Build a client from the `[admin]` configuration section.
    pub fn from_config(config: &AdminConfig) -> Result<Self, AdminError> {
        let client = Self::new(
            &config.url,
            &config.api_version,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(match (&config.username, &config.password) {
            (Some(user), Some(password)) => client.with_credentials(user, password),
            _ => client,
        })
    }

    /// Send basic-auth credentials with every request.
    #[must_use]
    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some((username.to_string(), password.to_string()));
        self
    }

    pub fn deployments_url(&self) -> &Url {
        &self.deployments_url
    }

    /// `<deployments_url>/<segments...>` with every segment percent-encoded.
    /// An empty last segment leaves a trailing slash.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, AdminError> {
        let mut url = self.deployments_url.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, resource: &str) -> Result<T, AdminError> {
        debug!(url = %url, "Admin API request");

        let mut request = self.client.get(url.clone());
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(classify_failure(status, &body, resource, url.as_str()));
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| AdminError::Decode {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        envelope.response.ok_or_else(|| AdminError::Decode {
            url: url.to_string(),
            reason: format!(
                "envelope has no response (status: {})",
                envelope.status.as_deref().unwrap_or("unknown")
            ),
        })
    }
}

fn classify_failure(status: StatusCode, body: &str, resource: &str, url: &str) -> AdminError {
    match serde_json::from_str::<Envelope<serde_json::Value>>(body) {
        Ok(envelope) => {
            debug!(
                url,
                status = status.as_u16(),
                message_id = envelope.message_id.as_deref().unwrap_or(""),
                verbose = envelope.verbose.as_deref().unwrap_or(""),
                "Admin API request failed"
            );
            let missing = status == StatusCode::NOT_FOUND
                || envelope.message_id.as_deref() == Some(MISSING_RESOURCE_MESSAGE_ID);
            if missing {
                AdminError::NotFound {
                    resource: resource.to_string(),
                    message_id: envelope.message_id,
                }
            } else {
                AdminError::Status {
                    status: status.as_u16(),
                    message: envelope
                        .message
                        .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string()),
                    message_id: envelope.message_id,
                }
            }
        }
        Err(_) => {
            warn!(url, status = status.as_u16(), "Admin API returned a non-envelope body");
            if status == StatusCode::NOT_FOUND {
                AdminError::not_found(resource)
            } else {
                AdminError::Status {
                    status: status.as_u16(),
                    message: body.trim().to_string(),
                    message_id: None,
                }
            }
        }
    }
}

#[async_trait]
impl AdminClient for RestAdminClient {
    async fn application_description(
        &self,
        application: &str,
    ) -> Result<ApplicationDescription, AdminError> {
        self.get(
            self.endpoint(&["applications", application, "description"])?,
            &format!("Application {application}"),
        )
        .await
    }

    async fn service_description(
        &self,
        application: &str,
        service: &str,
    ) -> Result<ServiceDescription, AdminError> {
        self.get(
            self.endpoint(&[application, "service", service, "description"])?,
            &format!("Service {service} of application {application}"),
        )
        .await
    }

    async fn service_descriptions(
        &self,
        deployment_id: &str,
    ) -> Result<Vec<ServiceDescription>, AdminError> {
        self.get(
            self.endpoint(&[deployment_id, "description"])?,
            &format!("Deployment {deployment_id}"),
        )
        .await
    }

    async fn deployment_events(
        &self,
        deployment_id: &str,
        from: u64,
        to: Option<u64>,
    ) -> Result<Vec<DeploymentEvent>, AdminError> {
        let to = to.map_or_else(|| "-1".to_string(), |t| t.to_string());
        let mut url = self.endpoint(&[deployment_id, "events", ""])?;
        url.query_pairs_mut()
            .append_pair("from", &from.to_string())
            .append_pair("to", &to);
        let page: EventPage = self
            .get(
                url,
                &format!("Events of deployment {deployment_id}"),
            )
            .await?;
        Ok(page.events)
    }

    async fn last_event(
        &self,
        deployment_id: &str,
    ) -> Result<Option<DeploymentEvent>, AdminError> {
        let page: EventPage = self
            .get(
                self.endpoint(&[deployment_id, "events", "last", ""])?,
                &format!("Events of deployment {deployment_id}"),
            )
            .await?;
        Ok(page.events.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployments_url_includes_api_version() {
        let client =
            RestAdminClient::new("http://localhost:8100", "2.7.0", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.deployments_url().as_str(),
            "http://localhost:8100/2.7.0/deployments/"
        );
    }

    #[test]
    fn deployments_url_keeps_base_path() {
        let client =
            RestAdminClient::new("http://admin:8100/rest", "/v1/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.deployments_url().as_str(),
            "http://admin:8100/rest/v1/deployments/"
        );
    }

    #[test]
    fn endpoints_encode_names_as_single_segments() {
        let client =
            RestAdminClient::new("http://localhost:8100", "2.7.0", Duration::from_secs(1)).unwrap();

        let url = client
            .endpoint(&["shop/eu?x#y", "service", "web 1", "description"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8100/2.7.0/deployments/shop%2Feu%3Fx%23y/service/web%201/description"
        );
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let url = client.endpoint(&["d1", "events", "last", ""]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8100/2.7.0/deployments/d1/events/last/");
    }

    #[test]
    fn missing_resource_message_id_maps_to_not_found() {
        let body = r#"{"status":"error","message":"not there","messageId":"missing_resource"}"#;
        let err = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, body, "Application a", "u");
        assert!(err.is_not_found());
    }

    #[test]
    fn plain_404_maps_to_not_found() {
        let err = classify_failure(StatusCode::NOT_FOUND, "<html>nope</html>", "Application a", "u");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Application a could not be found");
    }

    #[test]
    fn other_failures_keep_status_and_message() {
        let body = r#"{"status":"error","message":"database down","messageId":"internal"}"#;
        match classify_failure(StatusCode::SERVICE_UNAVAILABLE, body, "x", "u") {
            AdminError::Status {
                status, message, ..
            } => {
                assert_eq!(status, 503);
                assert_eq!(message, "database down");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }
}
