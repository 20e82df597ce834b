//! Handler for `deploywatch locate`.

use serde_json::json;

use super::command::LocateArgs;
use super::output;
use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::process::{service_process_ids, DelegatingProcessLocator, ProcessLocator, ShellLocatorScript};

/// Run the locator script and print the PIDs it reports.
pub async fn execute(args: &LocateArgs, config: &Config) -> Result<()> {
    let script = match &args.script {
        Some(command) => {
            let mut script = ShellLocatorScript::new(command);
            script.working_dir = Some(config.service.working_dir.clone());
            script
        }
        None => config
            .service
            .locator_script()?
            .ok_or(ConfigError::MissingField {
                field: "service.locator",
            })?,
    };

    let limit = config.service.pids_limit;
    let pids = tokio::task::spawn_blocking(move || {
        let mut locators: Vec<Box<dyn ProcessLocator>> =
            vec![Box::new(DelegatingProcessLocator::new(script))];
        service_process_ids(&mut locators, limit)
    })
    .await??;

    if output::is_json() {
        output::json_output(json!({
            "command": "locate",
            "service": config.service.name,
            "pids": pids,
        }));
        return Ok(());
    }

    if pids.is_empty() {
        output::warning("The locator reported no processes");
        return Ok(());
    }
    let list: Vec<String> = pids.iter().map(u32::to_string).collect();
    if output::is_quiet() {
        println!("{}", list.join(" "));
        return Ok(());
    }
    output::field("Service", &config.service.name);
    output::field("PIDs", output::highlight(list.join(", ")));
    Ok(())
}
