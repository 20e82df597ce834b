//! CLI module graph.

pub mod check;
pub mod command;
pub mod diagnostic;
pub mod launch;
pub mod locate;
pub mod output;
pub mod paths;
pub mod probe;
pub mod tail;
pub mod wait;

use std::path::Path;

pub use command::{Cli, ColorChoice, Commands, WaitCommand};

use crate::config::Config;
use crate::error::Result;

/// Dispatch a parsed command. `source` is the config file that was loaded,
/// if any.
pub async fn execute(cli: &Cli, config: &Config, source: Option<&Path>) -> Result<()> {
    match &cli.command {
        Commands::Wait(command) => wait::execute(command, config).await,
        Commands::Probe => probe::execute(config).await,
        Commands::Locate(args) => locate::execute(args, config).await,
        Commands::Launch(args) => launch::execute(args, config).await,
        Commands::Tail(args) => tail::execute(args, config).await,
        Commands::Check => check::execute(config, source),
    }
}
