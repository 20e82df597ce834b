//! Command-line interface definitions.
//!
//! Defines the CLI structure for the `deploywatch` binary using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Deployment readiness and process supervision CLI
#[derive(Parser, Debug)]
#[command(name = "deploywatch")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file [default: ~/.deploywatch/config.toml]
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Increase output verbosity
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Override the configured log level (e.g. debug, info, warn)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Apply the choice to `owo-colors`' global override.
    pub fn apply(self) {
        match self {
            ColorChoice::Auto => owo_colors::unset_override(),
            ColorChoice::Always => owo_colors::set_override(true),
            ColorChoice::Never => owo_colors::set_override(false),
        }
    }
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Wait for a remote deployment to reach its planned topology
    #[command(subcommand)]
    Wait(WaitCommand),

    /// Run the configured liveness detectors once
    Probe,

    /// Print the process IDs of the configured service
    Locate(LocateArgs),

    /// Launch a service, confirm it started and supervise it
    Launch(LaunchArgs),

    /// Tail rotating log files in a directory
    Tail(TailArgs),

    /// Validate the configuration and print a summary
    Check,
}

/// Subcommands for `deploywatch wait`.
#[derive(Subcommand, Debug)]
pub enum WaitCommand {
    /// Wait until every service of an application runs its planned instances
    AppInstall(AppInstallArgs),
    /// Wait until a single service runs its planned instances
    ServiceInstall(ServiceInstallArgs),
    /// Wait until an application is gone
    AppUninstall(AppUninstallArgs),
    /// Wait until a single service is gone
    ServiceUninstall(ServiceUninstallArgs),
    /// Wait until a service runs exactly N instances
    Instances(InstancesArgs),
}

/// Options shared by every wait.
#[derive(Args, Debug, Clone, Copy)]
pub struct WaitOptions {
    /// Override the wait budget, in minutes
    #[arg(long)]
    pub timeout_minutes: Option<u64>,

    /// Fail on timeout instead of asking whether to keep waiting
    #[arg(long)]
    pub no_prompt: bool,
}

/// Arguments for `wait app-install`.
#[derive(Args, Debug)]
pub struct AppInstallArgs {
    /// Application name
    #[arg(long)]
    pub application: String,

    /// Deployment id whose event log is reported
    #[arg(long)]
    pub deployment_id: String,

    /// Planned instances per service, as NAME=COUNT (repeatable)
    #[arg(long = "service", value_name = "NAME=COUNT", required = true, value_parser = parse_planned)]
    pub services: Vec<(String, u32)>,

    #[command(flatten)]
    pub options: WaitOptions,
}

/// Arguments for `wait service-install`.
#[derive(Args, Debug)]
pub struct ServiceInstallArgs {
    #[arg(long)]
    pub application: String,

    #[arg(long)]
    pub service: String,

    /// Planned number of instances
    #[arg(long)]
    pub instances: u32,

    #[arg(long)]
    pub deployment_id: String,

    #[command(flatten)]
    pub options: WaitOptions,
}

/// Arguments for `wait app-uninstall`.
#[derive(Args, Debug)]
pub struct AppUninstallArgs {
    #[arg(long)]
    pub application: String,

    #[command(flatten)]
    pub options: WaitOptions,
}

/// Arguments for `wait service-uninstall`.
#[derive(Args, Debug)]
pub struct ServiceUninstallArgs {
    #[arg(long)]
    pub application: String,

    #[arg(long)]
    pub service: String,

    #[command(flatten)]
    pub options: WaitOptions,
}

/// Arguments for `wait instances`.
#[derive(Args, Debug)]
pub struct InstancesArgs {
    #[arg(long)]
    pub application: String,

    #[arg(long)]
    pub service: String,

    /// Exact number of instances to wait for
    #[arg(long)]
    pub instances: u32,

    #[command(flatten)]
    pub options: WaitOptions,
}

/// Arguments for `locate`.
#[derive(Args, Debug)]
pub struct LocateArgs {
    /// Shell command printing the PIDs, instead of `[service.locator]`
    #[arg(long)]
    pub script: Option<String>,
}

/// Arguments for `launch`.
#[derive(Args, Debug)]
pub struct LaunchArgs {
    /// Command to launch, after `--`
    #[arg(last = true, required = true, num_args = 1..)]
    pub command: Vec<String>,
}

/// Arguments for `tail`.
#[derive(Args, Debug)]
pub struct TailArgs {
    /// Directory holding the log files [default: the service logs directory]
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Regex a file name must match entirely [default: the service log pattern]
    #[arg(long)]
    pub pattern: Option<String>,

    /// Keep polling until interrupted
    #[arg(short, long)]
    pub follow: bool,
}

/// Parse a `NAME=COUNT` pair.
pub fn parse_planned(raw: &str) -> Result<(String, u32), String> {
    let (name, count) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=COUNT, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing service name in `{raw}`"));
    }
    let count = count
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid instance count in `{raw}`: {e}"))?;
    Ok((name.to_string(), count))
}
