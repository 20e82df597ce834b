//! Scripted [`AdminClient`] for topology tests.
//!
//! The client replays a list of [`Snapshot`]s. Every query answers from the
//! current snapshot; [`ScriptedAdminClient::advance`] moves to the next one
//! (staying on the last). With [`ScriptedAdminClient::advance_on`] the move
//! happens automatically after a given call, which lets a watcher driven by a
//! latch see a new snapshot on every tick.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::admin::{
    AdminClient, AdminError, ApplicationDescription, DeploymentEvent, DeploymentState,
    ServiceDescription,
};

pub const DEPLOYMENT_ID: &str = "deployment-1";

/// Admin API operations, for call counting and auto-advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Call {
    ApplicationDescription,
    ServiceDescription,
    ServiceDescriptions,
    DeploymentEvents,
    LastEvent,
}

/// State of the remote deployment at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    application: Option<DeploymentState>,
    services: BTreeMap<String, (u32, DeploymentState)>,
    events: Vec<DeploymentEvent>,
    deployment_missing: bool,
}

impl Snapshot {
    /// The application is unknown to the admin API.
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn application(state: DeploymentState) -> Self {
        Self {
            application: Some(state),
            ..Self::default()
        }
    }

    /// Add a service in the `Started` state.
    pub fn service(self, name: &str, instances: u32) -> Self {
        self.service_in(name, instances, DeploymentState::Started)
    }

    pub fn service_in(mut self, name: &str, instances: u32, state: DeploymentState) -> Self {
        self.services.insert(name.to_string(), (instances, state));
        self
    }

    /// Append an event; indexes are assigned in order from 0.
    pub fn event(mut self, description: &str) -> Self {
        let index = self.events.len() as u64;
        self.events.push(DeploymentEvent {
            index,
            description: description.to_string(),
        });
        self
    }

    /// The deployment itself is unknown (as after a finished uninstall).
    pub fn deployment_missing(mut self) -> Self {
        self.deployment_missing = true;
        self
    }
}

struct Script {
    snapshots: Vec<Snapshot>,
    cursor: usize,
    calls: HashMap<Call, u32>,
}

pub struct ScriptedAdminClient {
    application: String,
    script: Mutex<Script>,
    advance_on: Option<Call>,
}

impl ScriptedAdminClient {
    pub fn new(application: &str, snapshots: Vec<Snapshot>) -> Self {
        assert!(!snapshots.is_empty(), "at least one snapshot is required");
        Self {
            application: application.to_string(),
            script: Mutex::new(Script {
                snapshots,
                cursor: 0,
                calls: HashMap::new(),
            }),
            advance_on: None,
        }
    }

    /// Move to the next snapshot after every `call`.
    pub fn advance_on(mut self, call: Call) -> Self {
        self.advance_on = Some(call);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn advance(&self) {
        let mut script = self.script.lock();
        if script.cursor + 1 < script.snapshots.len() {
            script.cursor += 1;
        }
    }

    pub fn cursor(&self) -> usize {
        self.script.lock().cursor
    }

    pub fn calls(&self, call: Call) -> u32 {
        self.script.lock().calls.get(&call).copied().unwrap_or(0)
    }

    fn with_snapshot<T>(&self, call: Call, f: impl FnOnce(&Snapshot) -> T) -> T {
        let mut script = self.script.lock();
        *script.calls.entry(call).or_default() += 1;
        let result = f(&script.snapshots[script.cursor]);
        if self.advance_on == Some(call) && script.cursor + 1 < script.snapshots.len() {
            script.cursor += 1;
        }
        result
    }

    fn describe(&self, name: &str, count: u32, state: DeploymentState) -> ServiceDescription {
        ServiceDescription {
            service_name: name.to_string(),
            application_name: self.application.clone(),
            deployment_id: DEPLOYMENT_ID.to_string(),
            instance_count: count,
            planned_instances: count,
            service_state: state,
        }
    }
}

#[async_trait]
impl AdminClient for ScriptedAdminClient {
    async fn application_description(
        &self,
        application: &str,
    ) -> Result<ApplicationDescription, AdminError> {
        self.with_snapshot(Call::ApplicationDescription, |snapshot| {
            match snapshot.application {
                Some(state) if application == self.application => Ok(ApplicationDescription {
                    application_name: application.to_string(),
                    state,
                    services: snapshot
                        .services
                        .iter()
                        .map(|(name, (count, state))| self.describe(name, *count, *state))
                        .collect(),
                }),
                _ => Err(AdminError::not_found(format!("Application {application}"))),
            }
        })
    }

    async fn service_description(
        &self,
        application: &str,
        service: &str,
    ) -> Result<ServiceDescription, AdminError> {
        self.with_snapshot(Call::ServiceDescription, |snapshot| {
            match snapshot.services.get(service) {
                Some((count, state)) if application == self.application => {
                    Ok(self.describe(service, *count, *state))
                }
                _ => Err(AdminError::not_found(format!("Service {service}"))),
            }
        })
    }

    async fn service_descriptions(
        &self,
        deployment_id: &str,
    ) -> Result<Vec<ServiceDescription>, AdminError> {
        self.with_snapshot(Call::ServiceDescriptions, |snapshot| {
            if snapshot.deployment_missing || deployment_id != DEPLOYMENT_ID {
                return Err(AdminError::not_found(format!("Deployment {deployment_id}")));
            }
            Ok(snapshot
                .services
                .iter()
                .map(|(name, (count, state))| self.describe(name, *count, *state))
                .collect())
        })
    }

    async fn deployment_events(
        &self,
        deployment_id: &str,
        from: u64,
        to: Option<u64>,
    ) -> Result<Vec<DeploymentEvent>, AdminError> {
        self.with_snapshot(Call::DeploymentEvents, |snapshot| {
            if snapshot.deployment_missing || deployment_id != DEPLOYMENT_ID {
                return Err(AdminError::not_found(format!("Deployment {deployment_id}")));
            }
            Ok(snapshot
                .events
                .iter()
                .filter(|e| e.index >= from && to.map_or(true, |to| e.index <= to))
                .cloned()
                .collect())
        })
    }

    async fn last_event(
        &self,
        deployment_id: &str,
    ) -> Result<Option<DeploymentEvent>, AdminError> {
        self.with_snapshot(Call::LastEvent, |snapshot| {
            if snapshot.deployment_missing || deployment_id != DEPLOYMENT_ID {
                return Err(AdminError::not_found(format!("Deployment {deployment_id}")));
            }
            Ok(snapshot.events.last().cloned())
        })
    }
}

/// Records everything a watcher reports.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub changes: Mutex<Vec<(String, u32, u32)>>,
    pub drops: Mutex<Vec<(String, u32, u32)>>,
    pub events: Mutex<Vec<u64>>,
    pub idle_ticks: Mutex<u32>,
}

impl crate::topology::ProgressReporter for RecordingReporter {
    fn instances_changed(&self, service: &str, previous: u32, current: u32, _planned: u32) {
        self.changes
            .lock()
            .push((service.to_string(), previous, current));
    }

    fn instances_dropped(&self, service: &str, previous: u32, current: u32) {
        self.drops.lock().push((service.to_string(), previous, current));
    }

    fn event(&self, event: &DeploymentEvent) {
        self.events.lock().push(event.index);
    }

    fn no_change(&self) {
        *self.idle_ticks.lock() += 1;
    }
}
