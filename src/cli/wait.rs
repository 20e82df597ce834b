//! Handler for `deploywatch wait`.

use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use dialoguer::Confirm;
use indicatif::ProgressBar;
use tracing::info;

use super::command::{WaitCommand, WaitOptions};
use super::output;
use crate::admin::{AdminClient, DeploymentEvent, RestAdminClient};
use crate::config::settings::minutes;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::topology::{
    prepare_application_uninstall, prepare_service_uninstall, ApplicationInstall,
    CompletionStrategy, DeploymentUninstall, LifecycleWatcher, ProgressReporter,
    ServiceInstall, ServiceInstanceWait, Topology,
};

/// Extra time granted to a single-service wait when the operator keeps waiting.
const SERVICE_EXTENSION: Duration = Duration::from_secs(5 * 60);

/// Prints progress lines above a spinner.
struct OutputReporter {
    spinner: ProgressBar,
}

impl OutputReporter {
    fn print(&self, label: &str, message: &str) {
        let timestamp = chrono::Local::now().format("%H:%M:%S").to_string();
        self.spinner
            .suspend(|| output::progress(&timestamp, label, message));
    }
}

impl ProgressReporter for OutputReporter {
    fn instances_changed(&self, service: &str, _previous: u32, current: u32, planned: u32) {
        self.print(
            &format!("[{service}]"),
            &format!("{current}/{planned} instances"),
        );
    }

    fn instances_dropped(&self, service: &str, _previous: u32, current: u32) {
        self.print(&format!("[{service}]"), &format!("dropped to {current} instances"));
    }

    fn event(&self, event: &DeploymentEvent) {
        self.print("event", &event.description);
    }

    fn no_change(&self) {
        self.spinner.tick();
    }
}

/// Budgets of one wait.
struct Budget {
    timeout: Duration,
    extension: Duration,
    prompt: bool,
}

impl Budget {
    fn new(options: WaitOptions, default_timeout: Duration, extension: Duration) -> Self {
        let timeout = options
            .timeout_minutes
            .map_or(default_timeout, minutes);
        let prompt = !options.no_prompt && !output::is_json() && std::io::stdin().is_terminal();
        Self {
            timeout,
            extension,
            prompt,
        }
    }

    /// Ask whether to keep waiting after `err`. Only timeouts are retried.
    async fn keep_waiting(&self, err: &Error, spinner: &ProgressBar) -> Result<bool> {
        if !self.prompt || !err.is_timeout() {
            return Ok(false);
        }
        let question = format!(
            "{err} Keep waiting for another {} minutes?",
            self.extension.as_secs() / 60
        );
        let answer = spinner.suspend(|| Confirm::new().with_prompt(question).default(true).interact())?;
        if answer {
            info!(extension_secs = self.extension.as_secs(), "Extending wait");
        }
        Ok(answer)
    }
}

/// Execute a `wait` subcommand against the configured admin API.
pub async fn execute(command: &WaitCommand, config: &Config) -> Result<()> {
    let client: Arc<dyn AdminClient> = Arc::new(RestAdminClient::from_config(&config.admin)?);
    let polling = &config.polling;

    match command {
        WaitCommand::AppInstall(args) => {
            let planned: BTreeMap<String, u32> = args.services.iter().cloned().collect();
            let topology = Topology::install(&args.application, &args.deployment_id, planned);
            let budget = Budget::new(args.options, polling.timeout(), polling.extension());
            watch(
                client,
                ApplicationInstall,
                topology,
                budget,
                polling.interval(),
                &format!("Waiting for application {} to install", args.application),
                &format!("Application {} installed", args.application),
            )
            .await
        }
        WaitCommand::ServiceInstall(args) => {
            let planned = BTreeMap::from([(args.service.clone(), args.instances)]);
            let topology = Topology::install(&args.application, &args.deployment_id, planned);
            let budget = Budget::new(args.options, polling.service_timeout(), SERVICE_EXTENSION);
            watch(
                client,
                ServiceInstall::new(&args.service),
                topology,
                budget,
                polling.interval(),
                &format!("Waiting for service {} to install", args.service),
                &format!("Service {} installed", args.service),
            )
            .await
        }
        WaitCommand::AppUninstall(args) => {
            let topology = prepare_application_uninstall(client.as_ref(), &args.application).await?;
            let budget = Budget::new(args.options, polling.timeout(), polling.extension());
            watch(
                client,
                DeploymentUninstall::application(),
                topology,
                budget,
                polling.interval(),
                &format!("Waiting for application {} to uninstall", args.application),
                &format!("Application {} uninstalled", args.application),
            )
            .await
        }
        WaitCommand::ServiceUninstall(args) => {
            let topology =
                prepare_service_uninstall(client.as_ref(), &args.application, &args.service)
                    .await?;
            let budget = Budget::new(args.options, polling.service_timeout(), SERVICE_EXTENSION);
            watch(
                client,
                DeploymentUninstall::service(&args.service),
                topology,
                budget,
                polling.interval(),
                &format!("Waiting for service {} to uninstall", args.service),
                &format!("Service {} uninstalled", args.service),
            )
            .await
        }
        WaitCommand::Instances(args) => {
            let spinner = output::spinner(&format!(
                "Waiting for {} instances of {}",
                args.instances, args.service
            ));
            let budget = Budget::new(args.options, polling.service_timeout(), SERVICE_EXTENSION);
            let mut wait = ServiceInstanceWait::new(&args.application, &args.service, args.instances)
                .interval(polling.interval())
                .reporter(Arc::new(OutputReporter {
                    spinner: spinner.clone(),
                }));

            let mut timeout = budget.timeout;
            loop {
                match wait.wait(client.as_ref(), timeout).await {
                    Ok(_) => {
                        output::spinner_success(
                            &spinner,
                            &format!("{} runs {} instances", args.service, args.instances),
                        );
                        return Ok(());
                    }
                    Err(e) if budget.keep_waiting(&e, &spinner).await? => timeout = budget.extension,
                    Err(e) => {
                        output::spinner_fail(&spinner, &e.to_string());
                        return Err(e);
                    }
                }
            }
        }
    }
}

/// Drive a lifecycle watcher, extending the timeout while the operator agrees.
async fn watch<S: CompletionStrategy>(
    client: Arc<dyn AdminClient>,
    strategy: S,
    topology: Topology,
    budget: Budget,
    interval: Duration,
    waiting: &str,
    done: &str,
) -> Result<()> {
    let spinner = output::spinner(waiting);
    let reporter = Arc::new(OutputReporter {
        spinner: spinner.clone(),
    });
    let mut watcher = LifecycleWatcher::new(client, strategy, topology)
        .with_reporter(reporter)
        .with_interval(interval);

    let mut timeout = budget.timeout;
    loop {
        match watcher.wait(timeout).await {
            Ok(()) => {
                output::spinner_success(&spinner, done);
                return Ok(());
            }
            Err(e) if budget.keep_waiting(&e, &spinner).await? => timeout = budget.extension,
            Err(e) => {
                output::spinner_fail(&spinner, &e.to_string());
                return Err(e);
            }
        }
    }
}
