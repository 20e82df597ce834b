//! Handler for `deploywatch tail`.

use std::sync::Arc;

use super::command::TailArgs;
use super::output;
use crate::config::Config;
use crate::error::Result;
use crate::tail::DirectoryTailer;

/// Print what is in the matching files now; with `--follow`, keep printing
/// new lines until interrupted.
pub async fn execute(args: &TailArgs, config: &Config) -> Result<()> {
    let dir = args.dir.clone().unwrap_or_else(|| config.service.logs_dir());
    let pattern = args
        .pattern
        .clone()
        .unwrap_or_else(|| config.service.log_pattern());

    let tailer = Arc::new(DirectoryTailer::new(&dir, &pattern, output::log_line)?);

    let first = Arc::clone(&tailer);
    tokio::task::spawn_blocking(move || first.poll()).await??;
    if tailer.tracked().is_empty() {
        output::warning(&format!(
            "No file in {} matches /{pattern}/",
            dir.display()
        ));
    }

    if !args.follow {
        return Ok(());
    }

    let _handle = tailer.spawn(config.service.tailer_interval());
    // Runs until the ctrl-c branch in main wins; dropping the handle stops the task.
    std::future::pending::<()>().await;
    Ok(())
}
