//! Application settings loaded from defaults, an optional `.env` file and
//! the process environment.
//!
//! Precedence, highest first: environment variables, `.env` file, defaults.
//! Keys are read with the [`ENV_PREFIX`] prefix and matched case-insensitively.

use crate::errors::ConfigError;
use crate::observability::{LogFormat, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// Prefix for environment variables read by [`Settings`].
pub const ENV_PREFIX: &str = "SCOPECTX_";

/// Default env file name looked up in the working directory.
pub const DEFAULT_ENV_FILE: &str = ".env";

const ALLOWED_LOG_LEVELS: &[&str] = &["TRACE", "DEBUG", "INFO", "WARN", "WARNING", "ERROR"];

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development.
    #[default]
    Development,
    /// Pre-production.
    Staging,
    /// Production.
    Production,
}

impl Environment {
    const ALLOWED: &'static [&'static str] = &["development", "staging", "production"];

    /// Returns the lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" => Ok(Self::Production),
            _ => Err(ConfigError::invalid_value("environment", s, Self::ALLOWED)),
        }
    }
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Application name, used as the default log target.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Deployment environment.
    #[serde(default)]
    pub environment: Environment,
    /// Log level, normalised to upper case.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Console log format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Log file path; relative paths resolve against a caller-supplied root.
    #[serde(default = "default_log_file")]
    pub log_file: Option<PathBuf>,
}

fn default_app_name() -> String {
    "scopectx".to_string()
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("logs/app.log"))
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: Environment::default(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            log_file: default_log_file(),
        }
    }
}

impl Settings {
    /// Loads settings from the process environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Loads settings from an optional env file overlaid by the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::EnvFile` if the file exists but cannot be parsed,
    /// `ConfigError::NotUnicode` if a prefixed variable is not valid UTF-8,
    /// and `ConfigError::InvalidValue` for values outside their allowed set.
    pub fn load(env_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut vars = HashMap::new();

        if let Some(path) = env_file.filter(|p| p.exists()) {
            vars.extend(read_env_file(path)?);
        }
        vars.extend(prefixed_vars(std::env::vars_os())?);

        Self::from_vars(&vars)
    }

    /// Builds settings from a variable map, ignoring unrelated keys.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let lookup: HashMap<String, &str> = vars
            .iter()
            .filter_map(|(key, value)| {
                let upper = key.to_ascii_uppercase();
                upper
                    .strip_prefix(ENV_PREFIX)
                    .map(|field| (field.to_string(), value.as_str()))
            })
            .collect();

        let mut settings = Self::default();

        if let Some(name) = lookup.get("APP_NAME") {
            settings.app_name = (*name).to_string();
        }
        if let Some(environment) = lookup.get("ENVIRONMENT") {
            settings.environment = environment.parse()?;
        }
        if let Some(level) = lookup.get("LOG_LEVEL") {
            settings.log_level = validate_log_level(level)?;
        }
        if let Some(format) = lookup.get("LOG_FORMAT") {
            settings.log_format = format.parse()?;
        }
        if let Some(file) = lookup.get("LOG_FILE") {
            settings.log_file = (!file.is_empty()).then(|| PathBuf::from(file));
        }

        Ok(settings)
    }

    /// Resolves the log file path against `root` when it is relative.
    #[must_use]
    pub fn log_file_path(&self, root: &Path) -> Option<PathBuf> {
        self.log_file.as_ref().map(|path| {
            if path.is_absolute() {
                path.clone()
            } else {
                root.join(path)
            }
        })
    }

    /// Returns the logging configuration derived from these settings.
    #[must_use]
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig::new(&self.log_level)
            .with_format(self.log_format)
            .with_file(self.log_file.clone())
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let env_file_error = |err: dotenvy::Error| ConfigError::EnvFile {
        path: path.display().to_string(),
        message: err.to_string(),
    };

    dotenvy::from_path_iter(path)
        .map_err(env_file_error)?
        .map(|item| item.map_err(env_file_error))
        .collect()
}

/// Keeps the [`ENV_PREFIX`] variables. Unrelated variables are skipped even
/// when they are not valid UTF-8.
fn prefixed_vars(
    vars: impl IntoIterator<Item = (OsString, OsString)>,
) -> Result<HashMap<String, String>, ConfigError> {
    let mut prefixed = HashMap::new();
    for (key, value) in vars {
        let Some(key) = key.to_str() else { continue };
        if !key.to_ascii_uppercase().starts_with(ENV_PREFIX) {
            continue;
        }
        let value = value
            .into_string()
            .map_err(|_| ConfigError::NotUnicode { key: key.to_string() })?;
        prefixed.insert(key.to_string(), value);
    }
    Ok(prefixed)
}

fn validate_log_level(level: &str) -> Result<String, ConfigError> {
    let upper = level.trim().to_ascii_uppercase();
    if ALLOWED_LOG_LEVELS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(ConfigError::invalid_value("log_level", level, ALLOWED_LOG_LEVELS))
    }
}

static SETTINGS: OnceLock<Settings> = OnceLock::new();

/// Returns the cached settings, loading them on first call from
/// [`DEFAULT_ENV_FILE`] and the process environment.
pub fn settings() -> Result<&'static Settings, ConfigError> {
    if let Some(settings) = SETTINGS.get() {
        return Ok(settings);
    }
    let loaded = Settings::load(Some(Path::new(DEFAULT_ENV_FILE)))?;
    Ok(SETTINGS.get_or_init(|| loaded))
}

/// Loads a fresh settings instance, bypassing the cache.
pub fn reload_settings(env_file: Option<&Path>) -> Result<Settings, ConfigError> {
    Settings::load(env_file.or(Some(Path::new(DEFAULT_ENV_FILE))))
}
