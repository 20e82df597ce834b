use std::path::PathBuf;

use clap::Parser;
use deploywatch::cli::output::{self, OutputConfig};
use deploywatch::cli::{self, diagnostic, paths, Cli};
use deploywatch::config::Config;
use tokio::signal;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    cli.color.apply();
    output::configure(OutputConfig::new(cli.json, cli.quiet));

    let default_path = paths::default_config();
    let source: Option<PathBuf> = match &cli.config {
        Some(path) => Some(path.clone()),
        None if default_path.exists() => Some(default_path),
        None => None,
    };

    let config = match Config::load_or_default(source.as_deref(), None) {
        Ok(c) => c,
        Err(e) => {
            report_config_error(&e, source.as_deref());
            std::process::exit(1);
        }
    };

    let level = match (cli.log_level.as_deref(), cli.verbose) {
        (Some(level), _) => Some(level),
        (None, 0) => None,
        (None, 1) => Some("debug"),
        (None, _) => Some("trace"),
    };
    config
        .logging
        .clone()
        .with_overrides(level, cli.json_logs)
        .init();
    debug!(config = ?source, "Configuration loaded");

    tokio::select! {
        result = cli::execute(&cli, &config, source.as_deref()) => {
            if let Err(e) = result {
                output::error(&e.to_string());
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            info!("Interrupted");
        }
    }
}

fn report_config_error(err: &deploywatch::error::Error, path: Option<&std::path::Path>) {
    if let Some(path) = path {
        if let Ok(src) = std::fs::read_to_string(path) {
            let name = path.display().to_string();
            if let Some(diag) = diagnostic::from_config_error(err, &name, &src) {
                eprintln!("{}", diagnostic::render(diag));
                return;
            }
        }
    }
    output::error(&format!("Failed to load config: {err}"));
}
