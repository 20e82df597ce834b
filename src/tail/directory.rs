use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reader::RollingFileReader;
use crate::error::{ConfigError, Result};

/// Receives every new line found by a [`DirectoryTailer`].
pub trait LineHandler: Send + Sync {
    fn handle_line(&self, file: &str, line: &str);
}

impl<F> LineHandler for F
where
    F: Fn(&str, &str) + Send + Sync,
{
    fn handle_line(&self, file: &str, line: &str) {
        self(file, line)
    }
}

/// Routes `*.err` lines to `warn!` and everything else to `info!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLineHandler;

impl LineHandler for LogLineHandler {
    fn handle_line(&self, file: &str, line: &str) {
        if file.ends_with(".err") {
            warn!(file, "{line}");
        } else {
            info!(file, "{line}");
        }
    }
}

/// Tails every file in a directory whose whole name matches a pattern.
///
/// Polls are mutually exclusive per instance: the background loop and an
/// on-demand [`dump`](Self::dump) take the same lock.
pub struct DirectoryTailer {
    dir: PathBuf,
    pattern: Regex,
    handler: Box<dyn LineHandler>,
    readers: Mutex<BTreeMap<String, RollingFileReader>>,
    retry_policy: Option<(u32, Duration)>,
}

impl DirectoryTailer {
    /// Create a tailer for `dir`; `pattern` must match a file name entirely.
    pub fn new(
        dir: impl Into<PathBuf>,
        pattern: &str,
        handler: impl LineHandler + 'static,
    ) -> std::result::Result<Self, ConfigError> {
        let anchored = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            ConfigError::InvalidValue {
                field: "log_pattern",
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            dir: dir.into(),
            pattern: anchored,
            handler: Box::new(handler),
            readers: Mutex::new(BTreeMap::new()),
            retry_policy: None,
        })
    }

    /// Retry policy handed to every reader this tailer creates.
    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.retry_policy = Some((max_retries, retry_delay));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of the files currently tracked.
    pub fn tracked(&self) -> Vec<String> {
        self.readers.lock().keys().cloned().collect()
    }

    /// One synchronous tick: refresh the tracked set, then dispatch new lines.
    ///
    /// A failure to read one file is logged and the other files still run.
    ///
    /// # Errors
    ///
    /// Fails only when the directory itself cannot be listed.
    pub fn poll(&self) -> io::Result<()> {
        let mut readers = self.readers.lock();
        let present = self.matching_files()?;

        readers.retain(|name, reader| {
            let keep = reader.exists() && present.contains_key(name);
            if !keep {
                debug!(file = %name, "Stopped tailing log file");
            }
            keep
        });
        for (name, path) in present {
            readers.entry(name).or_insert_with_key(|name| {
                debug!(file = %name, "Started tailing log file");
                let reader = RollingFileReader::new(path);
                match self.retry_policy {
                    Some((retries, delay)) => reader.with_retry_policy(retries, delay),
                    None => reader,
                }
            });
        }

        for (name, reader) in readers.iter_mut() {
            match reader.read_new() {
                Ok(text) => {
                    for line in text.lines().filter(|l| !l.is_empty()) {
                        self.handler.handle_line(name, line);
                    }
                }
                Err(e) => warn!(file = %name, error = %e, "Failed to read log file"),
            }
        }
        Ok(())
    }

    /// Flush whatever is new right now, e.g. after a failed launch.
    pub fn dump(&self) {
        if let Err(e) = self.poll() {
            warn!(dir = %self.dir.display(), error = %e, "Failed to dump log directory");
        }
    }

    /// Poll on a background task with `delay` between the end of one tick and
    /// the start of the next. The task stops when the handle is dropped.
    pub fn spawn(self: Arc<Self>, delay: Duration) -> TailerHandle {
        let task = tokio::spawn(async move {
            loop {
                let tailer = Arc::clone(&self);
                match tokio::task::spawn_blocking(move || tailer.poll()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(dir = %self.dir.display(), error = %e, "Failed to list log directory")
                    }
                    Err(e) => warn!(error = %e, "Log tailer tick panicked"),
                }
                tokio::time::sleep(delay).await;
            }
        });
        TailerHandle { task: Some(task) }
    }

    fn matching_files(&self) -> io::Result<BTreeMap<String, PathBuf>> {
        let mut files = BTreeMap::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if self.pattern.is_match(&name) {
                files.insert(name, entry.path());
            }
        }
        Ok(files)
    }
}

/// Handle to a background tailer task; aborts the task on drop.
pub struct TailerHandle {
    task: Option<JoinHandle<()>>,
}

impl TailerHandle {
    /// Stop the background loop and wait for it to wind down.
    pub async fn stop(mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        task.abort();
        match task.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for TailerHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_handler_accepts_any_file() {
        LogLineHandler.handle_line("svc.err", "boom");
        LogLineHandler.handle_line("svc.out", "ok");
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let result = DirectoryTailer::new("/tmp", "(", LogLineHandler);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn pattern_must_match_whole_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("svc.out"), "a\n").unwrap();
        fs::write(dir.path().join("svc.out.1"), "b\n").unwrap();
        let tailer = DirectoryTailer::new(dir.path(), r"svc\.(out|err)", LogLineHandler).unwrap();

        tailer.poll().unwrap();

        assert_eq!(tailer.tracked(), vec!["svc.out".to_string()]);
    }
}
