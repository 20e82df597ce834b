//! Miette diagnostics for configuration files.
//!
//! A TOML syntax or type error is rendered with the offending span of the
//! file highlighted.

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::error::{ConfigError, Error};

#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(deploywatch::config))]
pub struct ConfigDiagnostic {
    pub message: String,

    #[source_code]
    pub src: NamedSource<String>,

    #[label("here")]
    pub span: SourceSpan,

    #[help]
    pub help: Option<String>,
}

impl ConfigDiagnostic {
    /// Create a diagnostic pointing at `len` bytes from `offset` in `src`.
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        name: &str,
        src: impl Into<String>,
        offset: usize,
        len: usize,
    ) -> Self {
        Self {
            message: message.into(),
            src: NamedSource::new(name, src.into()),
            span: (offset, len).into(),
            help: None,
        }
    }

    /// Attach a help message.
    #[must_use]
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Build a span diagnostic for a TOML parse failure, if the error carries one.
pub fn from_config_error(err: &Error, name: &str, src: &str) -> Option<ConfigDiagnostic> {
    let Error::Config(ConfigError::Parse(parse)) = err else {
        return None;
    };
    let span = parse.span()?;
    let len = span.end.saturating_sub(span.start).max(1);
    Some(
        ConfigDiagnostic::new(parse.message(), name, src, span.start, len)
            .with_help("see `deploywatch check` for the expected sections"),
    )
}

/// Render a diagnostic the way miette's fancy handler would.
pub fn render(diagnostic: ConfigDiagnostic) -> String {
    format!("{:?}", miette::Report::new(diagnostic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn parse_errors_point_at_the_file() {
        let src = "[polling]\ninterval_ms = \"fast\"\n";
        let err = Config::parse_toml(src).unwrap_err();

        let diagnostic = from_config_error(&err, "config.toml", src).unwrap();

        assert!(diagnostic.span.offset() >= "[polling]\n".len());
        assert!(render(diagnostic).contains("interval_ms"));
    }

    #[test]
    fn validation_errors_have_no_span() {
        let src = "[polling]\ninterval_ms = 0\n";
        let err = Config::parse_toml(src).unwrap_err();

        assert!(from_config_error(&err, "config.toml", src).is_none());
    }
}
