//! Logging configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive, checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "CONTEXTKEEP_LOG";

/// Output format of the log layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Returns the format as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }

    /// Parses a format name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidInput(format!("unknown log format: {s}")))
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (for example `info` or `contextkeep=debug`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Append logs to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Sets the default level.
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub const fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets the log file.
    #[must_use]
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Picks the filter directive: `CONTEXTKEEP_LOG`, then `RUST_LOG`, then
    /// the configured level.
    pub(crate) fn directive(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        [LOG_ENV_VAR, "RUST_LOG"]
            .into_iter()
            .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
            .unwrap_or_else(|| self.level.clone())
    }

    /// Builds the env filter for this configuration.
    ///
    /// An unparseable directive falls back to `warn`.
    pub(crate) fn filter(&self, lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
        let directive = self.directive(lookup);
        EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_precedence() {
        let config = LoggingConfig::default().with_level("info");
        assert_eq!(config.directive(|_| None), "info");
        assert_eq!(
            config.directive(|name| (name == "RUST_LOG").then(|| "debug".to_string())),
            "debug"
        );
        assert_eq!(
            config.directive(|name| Some(format!("{name}-value"))),
            "CONTEXTKEEP_LOG-value"
        );
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("text"), Some(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
