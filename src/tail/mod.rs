//! Non-locking tails of rotating log files.
//!
//! [`RollingFileReader`] follows one file by path and survives truncation or
//! replacement; [`DirectoryTailer`] tracks every matching file in a directory
//! and hands new lines to a [`LineHandler`].

mod directory;
mod reader;

pub use directory::{DirectoryTailer, LineHandler, LogLineHandler, TailerHandle};
pub use reader::{RollingFileReader, TailState};

/// Whole-name pattern for a service's redirected output files.
pub fn service_log_pattern(service: &str) -> String {
    format!(r"{}\.(out|err)", regex::escape(service))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_name_is_escaped() {
        assert_eq!(service_log_pattern("my.svc"), r"my\.svc\.(out|err)");
    }
}
