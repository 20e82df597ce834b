//! Locating the OS processes that belong to a launched service.
//!
//! - [`HeuristicProcessLocator`] diffs this process's children around a launch
//!   and descends to the leaves of the new subtree.
//! - [`DelegatingProcessLocator`] asks an external script.
//!
//! Both sit behind [`ProcessLocator`]; [`service_process_ids`] merges the
//! results of several locators.

mod delegating;
mod heuristic;
mod provider;
mod tree;

use std::collections::BTreeSet;

use tracing::warn;

use crate::error::{Error, Result};

pub use delegating::{parse_pid_list, DelegatingProcessLocator, LocatorScript, ShellLocatorScript};
pub use heuristic::HeuristicProcessLocator;
pub use provider::{Pid, ProcessInfoProvider, SysinfoProvider};
pub use tree::ProcessTree;

/// Default upper bound on the number of PIDs a service may own.
pub const DEFAULT_PID_LIMIT: usize = 10;

/// Strategy for finding the PIDs of a launched service.
pub trait ProcessLocator: Send {
    /// Called right before the service command is spawned.
    fn before_launch(&mut self) -> Result<()> {
        Ok(())
    }

    /// PIDs of the service; empty when nothing could be found.
    fn locate(&mut self) -> Result<Vec<Pid>>;
}

/// Union of every locator's PIDs, sorted and deduplicated.
///
/// A locator that finds nothing is logged; more than `limit` PIDs overall is
/// an error.
pub fn service_process_ids(
    locators: &mut [Box<dyn ProcessLocator>],
    limit: usize,
) -> Result<Vec<Pid>> {
    let mut all = BTreeSet::new();
    for (index, locator) in locators.iter_mut().enumerate() {
        let pids = locator.locate()?;
        if pids.is_empty() {
            warn!(locator = index, "Process locator returned no process IDs");
        }
        all.extend(pids);
    }

    if all.len() > limit {
        return Err(Error::PidLimitExceeded {
            found: all.len(),
            limit,
        });
    }
    Ok(all.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<Pid>);

    impl ProcessLocator for Fixed {
        fn locate(&mut self) -> Result<Vec<Pid>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn union_is_sorted_and_deduplicated() {
        let mut locators: Vec<Box<dyn ProcessLocator>> =
            vec![Box::new(Fixed(vec![30, 10])), Box::new(Fixed(vec![10, 20])), Box::new(Fixed(vec![]))];

        assert_eq!(service_process_ids(&mut locators, 10).unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn too_many_pids_is_an_error() {
        let mut locators: Vec<Box<dyn ProcessLocator>> = vec![Box::new(Fixed((1..=4).collect()))];

        assert!(matches!(
            service_process_ids(&mut locators, 3),
            Err(Error::PidLimitExceeded { found: 4, limit: 3 })
        ));
    }
}
