//! Waiting for a remote deployment topology to be reached.
//!
//! [`LifecycleWatcher`] is the single polling driver. Each tick refreshes the
//! per-service instance counts, reports what moved, asks its
//! [`CompletionStrategy`] whether the operation is done, then forwards any new
//! entries of the deployment's event log. Driven by a [`PollLatch`], it
//! implements install and uninstall waits for both applications and single
//! services.

mod prepare;
mod reporter;
mod strategy;

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::admin::AdminClient;
use crate::error::{Error, Result};
use crate::latch::{PollLatch, Predicate};

pub use prepare::{prepare_application_uninstall, prepare_service_uninstall};
pub use reporter::{ProgressReporter, TracingReporter};
pub use strategy::{
    instance_count_or_zero, ApplicationInstall, CompletionStrategy, DeploymentUninstall, Direction,
    ServiceInstall, APPLICATION_INSTALL_TIMEOUT, APPLICATION_UNINSTALL_TIMEOUT,
    SERVICE_INSTALL_TIMEOUT, SERVICE_UNINSTALL_TIMEOUT,
};

/// Default delay between two topology polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Planned and observed instance counts of one install or uninstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub application: String,
    pub deployment_id: String,
    pub planned: BTreeMap<String, u32>,
    pub current: BTreeMap<String, u32>,
    /// Index of the last event already reported.
    pub last_event_index: Option<u64>,
}

impl Topology {
    /// Topology for an install: nothing is running yet.
    pub fn install(
        application: impl Into<String>,
        deployment_id: impl Into<String>,
        planned: BTreeMap<String, u32>,
    ) -> Self {
        let current = planned.keys().map(|name| (name.clone(), 0)).collect();
        Self {
            application: application.into(),
            deployment_id: deployment_id.into(),
            planned,
            current,
            last_event_index: None,
        }
    }

    /// Sum of all planned instances.
    pub fn planned_total(&self) -> u32 {
        self.planned.values().sum()
    }

    pub fn current_total(&self) -> u32 {
        self.current.values().sum()
    }
}

/// Polling driver for one install or uninstall.
pub struct LifecycleWatcher<S> {
    client: Arc<dyn AdminClient>,
    strategy: S,
    topology: Topology,
    reporter: Arc<dyn ProgressReporter>,
    interval: Duration,
}

impl<S: CompletionStrategy> LifecycleWatcher<S> {
    pub fn new(client: Arc<dyn AdminClient>, strategy: S, topology: Topology) -> Self {
        Self {
            client,
            strategy,
            topology,
            reporter: Arc::new(TracingReporter),
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// One poll. Returns whether the operation is complete.
    pub async fn tick(&mut self) -> Result<bool> {
        let client = self.client.as_ref();
        let mut moved = false;

        let services: Vec<(String, u32)> = self
            .topology
            .planned
            .iter()
            .map(|(name, planned)| (name.clone(), *planned))
            .collect();
        for (service, planned) in services {
            let count = self
                .strategy
                .current_instance_count(client, &self.topology, &service)
                .await?;
            let previous = self
                .topology
                .current
                .insert(service.clone(), count)
                .unwrap_or(0);
            let progressed = match self.strategy.direction() {
                Direction::Install => count > previous,
                Direction::Uninstall => count < previous,
            };
            if progressed {
                self.reporter
                    .instances_changed(&service, previous, count, planned);
                moved = true;
            }
        }

        let complete = self.strategy.is_complete(client, &self.topology).await?;

        if self.report_new_events().await? {
            moved = true;
        }
        if !moved && !complete {
            self.reporter.no_change();
        }
        Ok(complete)
    }

    /// Poll until complete or `timeout` passes.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] with the strategy's message, or the first error a
    /// tick returns.
    pub async fn wait(&mut self, timeout: Duration) -> Result<()> {
        let latch = PollLatch::new(timeout)
            .interval(self.interval)
            .timeout_message(self.strategy.timeout_message());
        latch.wait_for(self).await
    }

    async fn report_new_events(&mut self) -> Result<bool> {
        if self.topology.deployment_id.is_empty() {
            return Ok(false);
        }
        let from = self.topology.last_event_index.map_or(0, |index| index + 1);
        let events = match self
            .client
            .deployment_events(&self.topology.deployment_id, from, None)
            .await
        {
            Ok(events) => events,
            Err(e) if e.is_not_found() => {
                debug!(deployment = %self.topology.deployment_id, "No event log yet");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let mut reported = false;
        for event in events.iter().filter(|e| e.index >= from) {
            self.reporter.event(event);
            self.topology.last_event_index = Some(
                self.topology
                    .last_event_index
                    .map_or(event.index, |last| last.max(event.index)),
            );
            reported = true;
        }
        Ok(reported)
    }
}

#[async_trait]
impl<S: CompletionStrategy> Predicate for LifecycleWatcher<S> {
    async fn is_done(&mut self) -> Result<bool> {
        self.tick().await
    }
}

/// Wait until `service` runs exactly `planned` instances, polling at the
/// default interval and reporting through `tracing`.
///
/// Returns `Ok(true)` once reached.
///
/// # Errors
///
/// [`Error::Timeout`] carrying `timeout_message`, [`Error::InstancesExceeded`]
/// when more instances than planned show up, or any admin API failure other
/// than the service not existing yet.
pub async fn wait_for_service_instances(
    client: &dyn AdminClient,
    service: &str,
    application: &str,
    planned: u32,
    timeout_message: &str,
    timeout: Duration,
) -> Result<bool> {
    ServiceInstanceWait::new(application, service, planned)
        .timeout_message(timeout_message)
        .wait(client, timeout)
        .await
}

/// Configurable form of [`wait_for_service_instances`].
///
/// The last seen count survives across [`wait`](Self::wait) calls, so an
/// extended wait only reports what changed since the previous one.
pub struct ServiceInstanceWait {
    application: String,
    service: String,
    planned: u32,
    timeout_message: String,
    interval: Duration,
    reporter: Arc<dyn ProgressReporter>,
    last_seen: u32,
}

impl ServiceInstanceWait {
    pub fn new(application: impl Into<String>, service: impl Into<String>, planned: u32) -> Self {
        Self {
            application: application.into(),
            service: service.into(),
            planned,
            timeout_message: SERVICE_INSTALL_TIMEOUT.to_string(),
            interval: DEFAULT_POLL_INTERVAL,
            reporter: Arc::new(TracingReporter),
            last_seen: 0,
        }
    }

    #[must_use]
    pub fn timeout_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_message = message.into();
        self
    }

    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn last_seen(&self) -> u32 {
        self.last_seen
    }

    pub async fn wait(&mut self, client: &dyn AdminClient, timeout: Duration) -> Result<bool> {
        let latch = PollLatch::new(timeout)
            .interval(self.interval)
            .timeout_message(self.timeout_message.as_str());
        let mut poll = InstanceCountPoll { client, wait: self };
        latch.wait_for(&mut poll).await?;
        Ok(true)
    }
}

struct InstanceCountPoll<'a> {
    client: &'a dyn AdminClient,
    wait: &'a mut ServiceInstanceWait,
}

#[async_trait]
impl<'a> Predicate for InstanceCountPoll<'a> {
    async fn is_done(&mut self) -> Result<bool> {
        let wait = &mut *self.wait;
        let count = instance_count_or_zero(self.client, &wait.application, &wait.service).await?;
        if count > wait.planned {
            return Err(Error::InstancesExceeded {
                planned: wait.planned,
                actual: count,
            });
        }
        match count.cmp(&wait.last_seen) {
            Ordering::Greater => {
                wait.reporter
                    .instances_changed(&wait.service, wait.last_seen, count, wait.planned);
            }
            Ordering::Less => {
                wait.reporter
                    .instances_dropped(&wait.service, wait.last_seen, count);
            }
            Ordering::Equal => wait.reporter.no_change(),
        }
        wait.last_seen = count;
        Ok(count == wait.planned)
    }
}
