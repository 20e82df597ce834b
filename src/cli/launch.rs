//! Handler for `deploywatch launch`.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use super::command::LaunchArgs;
use super::output;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::process::SysinfoProvider;
use crate::startup::Launch;

/// Launch the command, wait for it to be detected as started, then
/// supervise it until it exits.
pub async fn execute(args: &LaunchArgs, config: &Config) -> Result<()> {
    let service = &config.service;
    let launch = Launch::from_config(service, Arc::new(SysinfoProvider::new()))?;

    let spinner = output::spinner(&format!("Starting {}", service.name));
    let launched = match launch.run(&args.command).await {
        Ok(launched) => launched,
        Err(e) => {
            output::spinner_fail(&spinner, &format!("{} failed to start", service.name));
            return Err(e);
        }
    };
    output::spinner_success(&spinner, &format!("{} started", service.name));

    if output::is_json() {
        output::json_output(json!({
            "command": "launch",
            "service": service.name,
            "pids": launched.pids,
        }));
    } else {
        let pids: Vec<String> = launched.pids.iter().map(u32::to_string).collect();
        output::field("PIDs", output::highlight(pids.join(", ")));
        output::field("Logs", output::muted(service.logs_dir().display()));
    }

    let status = launched.wait().await?;
    info!(service = %service.name, %status, "Service exited");
    match status.code() {
        Some(0) => {
            output::success(&format!("{} exited", service.name));
            Ok(())
        }
        Some(code) => Err(Error::LaunchFailed { code }),
        None => {
            output::warning(&format!("{} was terminated by a signal", service.name));
            Ok(())
        }
    }
}
