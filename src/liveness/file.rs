use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use super::plugin::{invalid, PluginConfig, FILE_PATH_KEY, REGEX_KEY, TIMEOUT_KEY};
use super::LivenessDetector;
use crate::error::{ConfigError, Result};
use crate::latch::{PollLatch, Predicate};
use crate::tail::RollingFileReader;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const CHECK_INTERVAL: Duration = Duration::from_secs(1);
/// Longest unterminated line kept between reads.
const MAX_PENDING_LINE: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct FileDetectorConfig {
    /// Absolute path, already resolved against the service directory.
    pub path: PathBuf,
    pub pattern: Regex,
    pub timeout: Duration,
    pub check_interval: Duration,
}

impl FileDetectorConfig {
    pub fn new(
        path: impl AsRef<Path>,
        pattern: &str,
        service_dir: &Path,
    ) -> std::result::Result<Self, ConfigError> {
        let pattern = Regex::new(pattern).map_err(|e| invalid(REGEX_KEY, e.to_string()))?;
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            service_dir.join(path)
        };
        Ok(Self {
            path,
            pattern,
            timeout: DEFAULT_TIMEOUT,
            check_interval: CHECK_INTERVAL,
        })
    }

    pub fn from_plugin(
        config: &PluginConfig,
        service_dir: &Path,
    ) -> std::result::Result<Self, ConfigError> {
        let path = config.required_string(FILE_PATH_KEY)?;
        let pattern = config.required_string(REGEX_KEY)?;
        let mut parsed = Self::new(path, &pattern, service_dir)?;
        if let Some(secs) = config.optional_u64(TIMEOUT_KEY)? {
            parsed.timeout = Duration::from_secs(secs);
        }
        Ok(parsed)
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }
}

/// Alive once a line matching the pattern shows up in the file.
///
/// Each call tails the file from its start for up to the configured timeout.
/// The file may appear during that window.
#[derive(Debug, Clone)]
pub struct FileLivenessDetector {
    config: FileDetectorConfig,
}

impl FileLivenessDetector {
    pub fn new(config: FileDetectorConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LivenessDetector for FileLivenessDetector {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn is_alive(&self) -> Result<bool> {
        let mut scan = LineScan {
            path: self.config.path.clone(),
            pattern: self.config.pattern.clone(),
            reader: None,
            pending: String::new(),
        };
        let latch = PollLatch::new(self.config.timeout).interval(self.config.check_interval);

        match latch.wait_for(&mut scan).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_timeout() => {
                debug!(file = %self.config.path.display(), "No matching line before the timeout");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Tail state for one detector call.
struct LineScan {
    path: PathBuf,
    pattern: Regex,
    reader: Option<RollingFileReader>,
    pending: String,
}

impl LineScan {
    fn matches(&mut self, text: &str) -> bool {
        self.pending.push_str(text);
        let complete_until = self.pending.rfind('\n').map_or(0, |i| i + 1);
        let found = self.pending.split('\n').any(|line| {
            let line = line.strip_suffix('\r').unwrap_or(line);
            !line.is_empty() && self.pattern.is_match(line)
        });
        self.pending.drain(..complete_until);
        // An unterminated line was already matched as is; past the cap it is
        // treated as complete and dropped.
        if self.pending.len() > MAX_PENDING_LINE {
            debug!(file = %self.path.display(), bytes = self.pending.len(), "Dropping unterminated line");
            self.pending.clear();
        }
        found
    }
}

#[async_trait]
impl Predicate for LineScan {
    async fn is_done(&mut self) -> Result<bool> {
        let reader = match self.reader.take() {
            Some(reader) => reader,
            None if self.path.exists() => {
                RollingFileReader::new(&self.path).with_retry_policy(0, Duration::ZERO)
            }
            None => return Ok(false),
        };

        let (reader, text) = tokio::task::spawn_blocking(move || {
            let mut reader = reader;
            let text = reader.read_new();
            (reader, text)
        })
        .await?;
        self.reader = Some(reader);
        let text = text?;

        if !text.is_empty() && self.matches(&text) {
            info!(file = %self.path.display(), pattern = %self.pattern, "Found matching log line");
            return Ok(true);
        }
        Ok(false)
    }
}
