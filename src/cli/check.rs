//! Handler for `deploywatch check`.

use std::path::Path;

use serde_json::json;

use super::output;
use crate::config::Config;
use crate::error::Result;

/// Print the effective configuration. Validation already ran while loading.
pub fn execute(config: &Config, source: Option<&Path>) -> Result<()> {
    let detectors = config.service.detector_configs()?;
    let locator = config.service.locator_script()?;
    let source_label = source.map_or_else(|| "defaults".to_string(), |p| p.display().to_string());

    if output::is_json() {
        let detectors: Vec<_> = detectors
            .iter()
            .map(|d| json!({ "kind": d.kind().to_string(), "target": d.target() }))
            .collect();
        output::json_output(json!({
            "command": "check",
            "valid": true,
            "source": source_label,
            "admin": {
                "url": config.admin.url,
                "api_version": config.admin.api_version,
                "authenticated": config.admin.username.is_some(),
            },
            "polling": {
                "interval_ms": config.polling.interval_ms,
                "timeout_minutes": config.polling.timeout_minutes,
                "extend_minutes": config.polling.extend_minutes,
                "service_timeout_minutes": config.polling.service_timeout_minutes,
            },
            "service": {
                "name": config.service.name,
                "logs_dir": config.service.logs_dir().display().to_string(),
                "log_pattern": config.service.log_pattern(),
                "pids_limit": config.service.pids_limit,
                "detectors": detectors,
                "locator": locator.map(|s| s.command),
            },
        }));
        return Ok(());
    }

    output::section("Configuration Check");
    output::field("Config", &source_label);
    output::success("Configuration is valid");

    output::section("Admin API");
    output::field("URL", &config.admin.url);
    output::field("API version", &config.admin.api_version);
    output::field(
        "Credentials",
        if config.admin.username.is_some() {
            "configured"
        } else {
            "none"
        },
    );

    output::section("Polling");
    output::field("Interval", format!("{}ms", config.polling.interval_ms));
    output::field("App timeout", format!("{}m", config.polling.timeout_minutes));
    output::field("Extension", format!("{}m", config.polling.extend_minutes));
    output::field(
        "Service timeout",
        format!("{}m", config.polling.service_timeout_minutes),
    );

    output::section(&format!("Service {}", config.service.name));
    output::field("Working dir", config.service.working_dir.display());
    output::field("Logs", config.service.logs_dir().display());
    output::field("Log pattern", config.service.log_pattern());
    output::field("PID limit", config.service.pids_limit);
    match &locator {
        Some(script) => output::field("Locator", &script.command),
        None => output::field("Locator", output::muted("process tree only")),
    }
    if detectors.is_empty() {
        output::warning("No liveness detectors configured; launches are assumed started");
    }
    for detector in &detectors {
        output::field(&detector.kind().to_string(), detector.target());
    }

    Ok(())
}
