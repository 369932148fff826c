//! Error types for the scopectx crate.
//!
//! Context operations are total apart from the few strict accessors and
//! registry creation; everything that can fail reports through the types
//! below and is never logged-and-swallowed.

use std::collections::HashMap;
use thiserror::Error;

/// The main error type for scopectx operations.
#[derive(Debug, Error)]
pub enum ScopectxError {
    /// A context or registry error.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// A key path could not be parsed or applied.
    #[error("{0}")]
    Path(#[from] PathError),

    /// Settings could not be loaded or validated.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The logging subscriber could not be installed.
    #[error("Logging error: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by [`Context`](crate::context::Context) and
/// [`ContextManager`](crate::context::ContextManager).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// A context with this name is already registered.
    #[error("Context '{name}' already exists")]
    DuplicateName {
        /// The conflicting context name.
        name: String,
    },

    /// A strict accessor was used on a key that is absent from the view.
    #[error("Key '{key}' not found in context '{context}'")]
    KeyNotFound {
        /// The context name.
        context: String,
        /// The missing key.
        key: String,
    },
}

impl ContextError {
    /// Creates a duplicate name error.
    #[must_use]
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    /// Creates a key not found error.
    #[must_use]
    pub fn key_not_found(context: impl Into<String>, key: impl Into<String>) -> Self {
        Self::KeyNotFound {
            context: context.into(),
            key: key.into(),
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();

        match self {
            Self::DuplicateName { name } => {
                map.insert("type".to_string(), serde_json::json!("DuplicateName"));
                map.insert("name".to_string(), serde_json::json!(name));
            }
            Self::KeyNotFound { context, key } => {
                map.insert("type".to_string(), serde_json::json!("KeyNotFound"));
                map.insert("context".to_string(), serde_json::json!(context));
                map.insert("key".to_string(), serde_json::json!(key));
            }
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Errors raised when parsing or applying a [`KeyPath`](crate::context::KeyPath).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path has no segments.
    #[error("Key path is empty")]
    Empty,

    /// A segment between separators is empty, e.g. `"a..b"`.
    #[error("Empty segment at position {position} in key path '{path}'")]
    EmptySegment {
        /// The offending path text.
        path: String,
        /// Zero-based segment position.
        position: usize,
    },

    /// Traversal reached a value that cannot hold the next segment.
    #[error("Cannot descend into '{at}': value is not a {expected}")]
    NotAContainer {
        /// The path prefix that resolved to the scalar.
        at: String,
        /// The container kind the next segment needed.
        expected: &'static str,
    },

    /// An index segment is past the end of an array.
    #[error("Index {index} out of range at '{at}' (length {len})")]
    IndexOutOfRange {
        /// The path prefix that resolved to the array.
        at: String,
        /// The requested index.
        index: usize,
        /// The array length.
        len: usize,
    },
}

/// Errors raised while loading [`Settings`](crate::config::Settings).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A setting holds a value outside its allowed set.
    #[error("Invalid value '{value}' for {field}: must be one of {}", allowed.join(", "))]
    InvalidValue {
        /// The setting name.
        field: String,
        /// The rejected value.
        value: String,
        /// The accepted values.
        allowed: Vec<String>,
    },

    /// A prefixed environment variable holds bytes that are not UTF-8.
    #[error("Environment variable '{key}' is not valid UTF-8")]
    NotUnicode {
        /// The variable name.
        key: String,
    },

    /// The env file could not be read or parsed.
    #[error("Failed to read env file '{path}': {message}")]
    EnvFile {
        /// The env file path.
        path: String,
        /// The underlying error.
        message: String,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(field: impl Into<String>, value: impl Into<String>, allowed: &[&str]) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            allowed: allowed.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}
