//! Path utilities for deploywatch.
//!
//! Per-user files live under `~/.deploywatch/`:
//! - `~/.deploywatch/config.toml` - default configuration

use std::path::PathBuf;

/// Returns the deploywatch home directory (`~/.deploywatch/`).
pub fn home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".deploywatch")
}

/// Returns the default config file path (`~/.deploywatch/config.toml`).
pub fn default_config() -> PathBuf {
    home_dir().join("config.toml")
}
