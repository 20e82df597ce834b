//! Handler for `deploywatch probe`.

use serde_json::json;
use tabled::Tabled;

use super::output;
use crate::config::Config;
use crate::error::Result;

/// One row of the probe table.
#[derive(Tabled)]
struct ProbeRow {
    #[tabled(rename = "Detector")]
    kind: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Run every configured detector once, without launching anything.
pub async fn execute(config: &Config) -> Result<()> {
    let configs = config.service.detector_configs()?;

    let mut rows = Vec::with_capacity(configs.len());
    let mut results = Vec::with_capacity(configs.len());
    for detector_config in &configs {
        let detector = detector_config.build()?;
        let (alive, status) = match detector.is_alive().await {
            Ok(true) => (Some(true), "alive".to_string()),
            Ok(false) => (Some(false), "not alive".to_string()),
            Err(e) => (None, format!("error: {e}")),
        };
        results.push(json!({
            "kind": detector_config.kind().to_string(),
            "target": detector_config.target(),
            "alive": alive,
            "status": status,
        }));
        rows.push(ProbeRow {
            kind: detector_config.kind().to_string(),
            target: detector_config.target(),
            status,
        });
    }

    if output::is_json() {
        output::json_output(json!({
            "command": "probe",
            "service": config.service.name,
            "detectors": results,
        }));
        return Ok(());
    }

    output::header(env!("CARGO_PKG_VERSION"));
    output::section(&format!("Liveness of {}", config.service.name));
    if rows.is_empty() {
        output::warning("No liveness detectors configured");
        output::hint("add [[service.detectors]] entries to the config file");
        return Ok(());
    }
    output::table(&rows);
    Ok(())
}
