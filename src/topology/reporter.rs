use tracing::{info, warn};

use crate::admin::DeploymentEvent;

/// Sink for deployment progress produced by a watcher tick.
pub trait ProgressReporter: Send + Sync {
    /// Instance count of `service` moved in the expected direction.
    fn instances_changed(&self, service: &str, previous: u32, current: u32, planned: u32);

    /// A new entry of the remote event log.
    fn event(&self, event: &DeploymentEvent);

    /// Instance count of `service` moved against the expected direction.
    fn instances_dropped(&self, _service: &str, _previous: u32, _current: u32) {}

    /// Nothing moved during the last tick.
    fn no_change(&self) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn instances_changed(&self, service: &str, previous: u32, current: u32, planned: u32) {
        info!(service, previous, current, planned, "[{service}] {current}/{planned} instances");
    }

    fn instances_dropped(&self, service: &str, previous: u32, current: u32) {
        warn!(service, previous, current, "[{service}] dropped to {current} instances");
    }

    fn event(&self, event: &DeploymentEvent) {
        info!(index = event.index, "{}", event.description);
    }
}
