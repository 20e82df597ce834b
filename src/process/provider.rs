//! OS process information port and its `sysinfo` implementation.

use std::ffi::OsStr;
use std::path::Path;

use parking_lot::Mutex;
use sysinfo::{Pid as SysPid, ProcessesToUpdate, System};

use crate::error::{Error, Result};

/// Operating-system process identifier.
pub type Pid = u32;

/// Read-only access to the OS process table.
///
/// Implementations must be cheap to call repeatedly; the heuristic locator
/// rebuilds a full snapshot on every locate attempt.
pub trait ProcessInfoProvider: Send + Sync {
    /// PID of the running process.
    fn current_pid(&self) -> Result<Pid>;

    /// Every PID visible right now.
    fn list_pids(&self) -> Result<Vec<Pid>>;

    /// Parent of `pid`, `None` for roots.
    fn parent_pid(&self, pid: Pid) -> Result<Option<Pid>>;

    /// Executable name (not the full path) of `pid`.
    fn executable_name(&self, pid: Pid) -> Result<String>;

    /// Command line arguments of `pid`, including argv[0].
    fn arguments(&self, pid: Pid) -> Result<Vec<String>>;
}

/// [`ProcessInfoProvider`] backed by a refreshed `sysinfo` snapshot.
///
/// `list_pids` refreshes the snapshot; the per-PID queries answer from the
/// most recent one.
pub struct SysinfoProvider {
    system: Mutex<System>,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Self {
            system: Mutex::new(system),
        }
    }

    fn with_process<T>(
        &self,
        pid: Pid,
        f: impl FnOnce(&sysinfo::Process) -> T,
    ) -> Result<T> {
        let system = self.system.lock();
        system
            .process(SysPid::from_u32(pid))
            .map(f)
            .ok_or_else(|| Error::process(pid, "no such process"))
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInfoProvider for SysinfoProvider {
    fn current_pid(&self) -> Result<Pid> {
        Ok(std::process::id())
    }

    fn list_pids(&self) -> Result<Vec<Pid>> {
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::All, true);
        // Linux threads show up as tasks; only whole processes count.
        let mut pids: Vec<Pid> = system
            .processes()
            .iter()
            .filter(|(_, process)| process.thread_kind().is_none())
            .map(|(pid, _)| pid.as_u32())
            .collect();
        if pids.is_empty() {
            return Err(Error::Process {
                pid: None,
                reason: "the process table is empty".to_string(),
            });
        }
        pids.sort_unstable();
        Ok(pids)
    }

    fn parent_pid(&self, pid: Pid) -> Result<Option<Pid>> {
        self.with_process(pid, |process| process.parent().map(|p| p.as_u32()))
    }

    fn executable_name(&self, pid: Pid) -> Result<String> {
        self.with_process(pid, |process| lossy(process.name()))
    }

    fn arguments(&self, pid: Pid) -> Result<Vec<String>> {
        self.with_process(pid, |process| process.cmd().iter().map(|a| lossy(a)).collect())
    }
}

fn lossy(value: &OsStr) -> String {
    value.to_string_lossy().into_owned()
}

/// Final path component of an executable name, for shell detection.
pub(crate) fn base_name(executable: &str) -> &str {
    Path::new(executable)
        .file_name()
        .and_then(OsStr::to_str)
        .unwrap_or(executable)
}
