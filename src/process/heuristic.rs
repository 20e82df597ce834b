use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::provider::{base_name, Pid, ProcessInfoProvider};
use super::tree::ProcessTree;
use super::ProcessLocator;
use crate::error::{Error, Result};

const SHELL_NAMES: &[&str] = &["sh", "bash", "dash", "zsh", "cmd.exe"];

/// Finds a launched service by diffing this process's children before and
/// after launch, then descending to the leaves of the new child.
///
/// Launch wrappers (shells, `nohup`, start scripts) usually fork the real
/// service binary, so the leaves of the new subtree are reported rather than
/// the direct child.
pub struct HeuristicProcessLocator {
    provider: Arc<dyn ProcessInfoProvider>,
    before: Option<BTreeSet<Pid>>,
}

impl HeuristicProcessLocator {
    pub fn new(provider: Arc<dyn ProcessInfoProvider>) -> Self {
        Self {
            provider,
            before: None,
        }
    }

    fn own_children(&self) -> Result<(ProcessTree, BTreeSet<Pid>)> {
        let me = self.provider.current_pid()?;
        let tree = ProcessTree::build(self.provider.as_ref())?;
        if !tree.contains(me) {
            return Err(Error::Process {
                pid: Some(me),
                reason: "the current process is missing from the process table".to_string(),
            });
        }
        let children = tree.children(me);
        Ok((tree, children))
    }

    fn warn_if_shell(&self, pid: Pid) {
        match self.provider.executable_name(pid) {
            Ok(name) if SHELL_NAMES.contains(&base_name(&name)) => warn!(
                pid,
                executable = %name,
                "Located process is a shell; the service may be wrapped in a script that \
                 has not started it yet"
            ),
            Ok(_) => {}
            Err(e) => debug!(pid, error = %e, "Could not read executable name"),
        }
    }
}

impl ProcessLocator for HeuristicProcessLocator {
    fn before_launch(&mut self) -> Result<()> {
        let (_, children) = self.own_children()?;
        debug!(children = ?children, "Recorded child processes before launch");
        self.before = Some(children);
        Ok(())
    }

    fn locate(&mut self) -> Result<Vec<Pid>> {
        let Some(before) = self.before.as_ref() else {
            return Err(Error::Process {
                pid: None,
                reason: "locate called before the pre-launch snapshot was taken".to_string(),
            });
        };

        let (tree, after) = self.own_children()?;
        let new_children: Vec<Pid> = after.difference(before).copied().collect();

        let child = match new_children.as_slice() {
            [] => {
                warn!("No new child process found after launch; the service may have exited");
                return Ok(Vec::new());
            }
            [only] => *only,
            [lowest, ..] => {
                warn!(
                    candidates = ?new_children,
                    chosen = lowest,
                    "Multiple new child processes found after launch; choosing the lowest PID"
                );
                *lowest
            }
        };

        let leaves = tree.leaves(child);
        for &pid in &leaves {
            self.warn_if_shell(pid);
        }
        info!(child, pids = ?leaves, "Located service processes");
        Ok(leaves)
    }
}
