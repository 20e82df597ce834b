use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-file tail position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailState {
    pub last_modified: Option<SystemTime>,
    /// Byte offset of the next unread byte.
    pub file_pointer: u64,
    pub last_known_length: u64,
    pub exists: bool,
}

/// Incremental reader for a file that may be rotated underneath it.
///
/// The file is opened only for the duration of a read so the writer can
/// rename, truncate or delete it freely. A fresh reader starts at offset 0.
#[derive(Debug)]
pub struct RollingFileReader {
    path: PathBuf,
    state: TailState,
    max_retries: u32,
    retry_delay: Duration,
}

impl RollingFileReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_known_length = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        Self {
            path,
            state: TailState {
                last_modified: None,
                file_pointer: 0,
                last_known_length,
                exists: true,
            },
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override how often and how long to retry opening a vanished file.
    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &TailState {
        &self.state
    }

    /// `false` once the file vanished and every retry failed.
    pub fn exists(&self) -> bool {
        self.state.exists
    }

    /// Whether modification time or length changed since the last read.
    ///
    /// Unreadable metadata counts as a change so the next read can notice a
    /// vanished file.
    pub fn was_modified(&self) -> bool {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                meta.modified().ok() != self.state.last_modified
                    || meta.len() != self.state.last_known_length
            }
            Err(_) => true,
        }
    }

    /// Read everything appended since the last call.
    ///
    /// Returns an empty string when nothing changed, or when the file is gone
    /// and retries are exhausted (the reader is then marked as not existing).
    /// A file shorter than the recorded offset is treated as rotated and read
    /// from the start.
    ///
    /// # Errors
    ///
    /// I/O errors other than the file being absent.
    pub fn read_new(&mut self) -> io::Result<String> {
        if !self.was_modified() {
            return Ok(String::new());
        }

        let mut attempt = 0;
        let mut file = loop {
            match File::open(&self.path) {
                Ok(file) => break file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if attempt >= self.max_retries {
                        warn!(file = %self.path.display(), "Log file no longer exists");
                        self.state.exists = false;
                        self.state.file_pointer = 0;
                        return Ok(String::new());
                    }
                    attempt += 1;
                    debug!(file = %self.path.display(), attempt, "Log file missing, retrying");
                    thread::sleep(self.retry_delay);
                }
                Err(e) => return Err(e),
            }
        };
        self.state.exists = true;

        let meta = file.metadata()?;
        let length = meta.len();
        if self.state.file_pointer > length {
            debug!(file = %self.path.display(), "Log file rotated, reading from the start");
            self.state.file_pointer = 0;
        }

        file.seek(SeekFrom::Start(self.state.file_pointer))?;
        let mut bytes = Vec::new();
        file.by_ref()
            .take(length - self.state.file_pointer)
            .read_to_end(&mut bytes)?;
        drop(file);

        self.state.file_pointer += bytes.len() as u64;
        self.state.last_known_length = length;
        self.state.last_modified = meta.modified().ok();

        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn existing_content_is_read_from_the_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.out");
        fs::write(&path, "first\n").unwrap();

        let mut reader = RollingFileReader::new(&path);

        assert_eq!(reader.read_new().unwrap(), "first\n");
        assert_eq!(reader.state().file_pointer, 6);
    }

    #[test]
    fn appended_bytes_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.out");
        fs::write(&path, "one\n").unwrap();
        let mut reader = RollingFileReader::new(&path);
        reader.read_new().unwrap();

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "two\n").unwrap();
        drop(file);

        assert_eq!(reader.read_new().unwrap(), "two\n");
    }

    #[test]
    fn vanished_file_is_marked_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svc.out");
        fs::write(&path, "x").unwrap();
        let mut reader = RollingFileReader::new(&path).with_retry_policy(2, Duration::from_millis(1));
        reader.read_new().unwrap();

        fs::remove_file(&path).unwrap();

        assert_eq!(reader.read_new().unwrap(), "");
        assert!(!reader.exists());
    }
}
