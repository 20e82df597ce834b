use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use super::provider::{Pid, ProcessInfoProvider};
use crate::error::Result;

/// Snapshot of parent to child links, built fresh for every locate attempt.
#[derive(Debug, Default, Clone)]
pub struct ProcessTree {
    children: HashMap<Pid, BTreeSet<Pid>>,
    known: BTreeSet<Pid>,
}

impl ProcessTree {
    /// Snapshot the process table through `provider`.
    ///
    /// Processes whose parent cannot be queried (typically because they
    /// exited mid-scan) are logged and skipped. A failed listing is an error.
    pub fn build(provider: &dyn ProcessInfoProvider) -> Result<Self> {
        let mut tree = Self::default();
        for pid in provider.list_pids()? {
            match provider.parent_pid(pid) {
                Ok(parent) => tree.insert(pid, parent),
                Err(e) => warn!(pid, error = %e, "Skipping process while building the process tree"),
            }
        }
        Ok(tree)
    }

    /// Record `pid` with an optional parent link.
    pub fn insert(&mut self, pid: Pid, parent: Option<Pid>) {
        self.known.insert(pid);
        self.children.entry(pid).or_default();
        if let Some(parent) = parent {
            self.children.entry(parent).or_default().insert(pid);
        }
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.known.contains(&pid)
    }

    /// Direct children of `pid`, empty when unknown.
    pub fn children(&self, pid: Pid) -> BTreeSet<Pid> {
        self.children.get(&pid).cloned().unwrap_or_default()
    }

    /// Every descendant of `root` without children, in ascending PID order.
    ///
    /// `root` itself is returned when it has no children.
    pub fn leaves(&self, root: Pid) -> Vec<Pid> {
        let mut leaves = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![root];

        while let Some(pid) = stack.pop() {
            if !visited.insert(pid) {
                continue;
            }
            match self.children.get(&pid) {
                Some(kids) if !kids.is_empty() => stack.extend(kids.iter().copied()),
                _ => {
                    leaves.insert(pid);
                }
            }
        }

        leaves.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(links: &[(Pid, Option<Pid>)]) -> ProcessTree {
        let mut tree = ProcessTree::default();
        for &(pid, parent) in links {
            tree.insert(pid, parent);
        }
        tree
    }

    #[test]
    fn leaves_of_nested_tree() {
        let tree = tree(&[
            (1, None),
            (10, Some(1)),
            (11, Some(10)),
            (12, Some(10)),
            (13, Some(12)),
        ]);

        assert_eq!(tree.leaves(10), vec![11, 13]);
    }

    #[test]
    fn childless_root_is_its_own_leaf() {
        let tree = tree(&[(1, None), (7, Some(1))]);
        assert_eq!(tree.leaves(7), vec![7]);
    }

    #[test]
    fn children_of_unknown_pid_is_empty() {
        let tree = tree(&[(1, None)]);
        assert!(tree.children(99).is_empty());
        assert!(!tree.contains(99));
    }

    #[test]
    fn cyclic_links_terminate() {
        let mut tree = tree(&[(2, Some(3))]);
        tree.insert(3, Some(2));
        // Both nodes have children, so no leaves are found, but the walk ends.
        assert!(tree.leaves(2).is_empty());
    }
}
