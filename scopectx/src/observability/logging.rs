//! `tracing-subscriber` installation.

use crate::errors::{ConfigError, ScopectxError};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Console log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::invalid_value("log_format", s, &["pretty", "json"])),
        }
    }
}

/// What [`init_logging`] installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    level: String,
    format: LogFormat,
    file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("INFO")
    }
}

impl LoggingConfig {
    /// Creates a console-only configuration at `level`.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            file: None,
        }
    }

    /// Sets the console format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Sets or clears the log file. File output is always JSON.
    #[must_use]
    pub fn with_file(mut self, file: Option<PathBuf>) -> Self {
        self.file = file;
        self
    }

    /// Returns the configured level.
    #[must_use]
    pub fn level(&self) -> &str {
        &self.level
    }

    /// Returns the console format.
    #[must_use]
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Returns the log file path, if any.
    #[must_use]
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Returns the `EnvFilter` directive for the configured level.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        match self.level.trim().to_ascii_uppercase().as_str() {
            "WARNING" | "WARN" => "warn".to_string(),
            other => other.to_ascii_lowercase(),
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns an error
/// when a subscriber is already installed or the log file cannot be opened.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ScopectxError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match config.format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
    });

    if let Some(path) = config.file() {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        layers.push(
            fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()?;

    tracing::debug!(
        level = %config.level,
        format = ?config.format,
        file = ?config.file,
        "Logging initialised"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_filter_directive() {
        assert_eq!(LoggingConfig::new("WARNING").filter_directive(), "warn");
        assert_eq!(LoggingConfig::new("DEBUG").filter_directive(), "debug");
        assert_eq!(LoggingConfig::default().filter_directive(), "info");
    }

    #[test]
    fn test_init_logging_twice_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("app.log");
        let config = LoggingConfig::new("ERROR").with_file(Some(file.clone()));

        // Another test may already own the global subscriber; either way the
        // second call must report an error rather than panic.
        let _ = init_logging(&config);
        assert!(matches!(
            init_logging(&config),
            Err(ScopectxError::Logging(_))
        ));
        assert!(file.parent().unwrap().exists());
    }
}
