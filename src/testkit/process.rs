//! Synthetic process table implementing [`ProcessInfoProvider`].

use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::process::{Pid, ProcessInfoProvider};

#[derive(Debug, Clone)]
struct Entry {
    parent: Option<Pid>,
    name: String,
    args: Vec<String>,
}

/// In-memory process table. Starts with `init` (PID 1) and the current
/// process as its child.
#[derive(Debug)]
pub struct ProcessTable {
    current: Pid,
    entries: Mutex<BTreeMap<Pid, Entry>>,
    broken: Mutex<Vec<Pid>>,
}

impl ProcessTable {
    pub fn new(current: Pid) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            1,
            Entry {
                parent: None,
                name: "init".to_string(),
                args: vec!["init".to_string()],
            },
        );
        entries.insert(
            current,
            Entry {
                parent: Some(1),
                name: "deploywatch".to_string(),
                args: vec!["deploywatch".to_string()],
            },
        );
        Self {
            current,
            entries: Mutex::new(entries),
            broken: Mutex::new(Vec::new()),
        }
    }

    /// Add a process named `name` under `parent`.
    pub fn spawn(&self, pid: Pid, parent: Pid, name: &str) {
        self.entries.lock().insert(
            pid,
            Entry {
                parent: Some(parent),
                name: name.to_string(),
                args: vec![name.to_string()],
            },
        );
    }

    pub fn remove(&self, pid: Pid) {
        self.entries.lock().remove(&pid);
    }

    /// Make every query about `pid` fail, as for a process exiting mid-scan.
    pub fn break_pid(&self, pid: Pid) {
        self.broken.lock().push(pid);
    }

    fn entry(&self, pid: Pid) -> Result<Entry> {
        if self.broken.lock().contains(&pid) {
            return Err(Error::process(pid, "process vanished"));
        }
        self.entries
            .lock()
            .get(&pid)
            .cloned()
            .ok_or_else(|| Error::process(pid, "no such process"))
    }
}

impl ProcessInfoProvider for ProcessTable {
    fn current_pid(&self) -> Result<Pid> {
        Ok(self.current)
    }

    fn list_pids(&self) -> Result<Vec<Pid>> {
        Ok(self.entries.lock().keys().copied().collect())
    }

    fn parent_pid(&self, pid: Pid) -> Result<Option<Pid>> {
        self.entry(pid).map(|e| e.parent)
    }

    fn executable_name(&self, pid: Pid) -> Result<String> {
        self.entry(pid).map(|e| e.name)
    }

    fn arguments(&self, pid: Pid) -> Result<Vec<String>> {
        self.entry(pid).map(|e| e.args)
    }
}
