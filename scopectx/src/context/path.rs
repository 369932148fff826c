//! Dotted key paths into nested context values.

use super::Context;
use crate::errors::PathError;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// One step of a [`KeyPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// An object member.
    Key(String),
    /// An array element.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// A parsed path such as `user.roles.0`.
///
/// The first segment always names a context key. Later all-digit segments
/// address array elements, everything else addresses object members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    root: String,
    rest: Vec<PathSegment>,
}

impl KeyPath {
    /// Builds a path from a root key and further segments.
    #[must_use]
    pub fn new(root: impl Into<String>, rest: Vec<PathSegment>) -> Self {
        Self {
            root: root.into(),
            rest,
        }
    }

    /// Parses a dotted path.
    ///
    /// # Errors
    ///
    /// Returns `PathError::Empty` for an empty string and
    /// `PathError::EmptySegment` when two separators are adjacent or the path
    /// starts or ends with one.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }

        let mut parts = Vec::new();
        for (position, part) in path.split('.').enumerate() {
            if part.is_empty() {
                return Err(PathError::EmptySegment {
                    path: path.to_string(),
                    position,
                });
            }
            parts.push(part);
        }

        let (root, rest) = parts.split_first().ok_or(PathError::Empty)?;
        let rest = rest
            .iter()
            .map(|part| {
                if part.bytes().all(|b| b.is_ascii_digit()) {
                    part.parse()
                        .map_or_else(|_| PathSegment::Key((*part).to_string()), PathSegment::Index)
                } else {
                    PathSegment::Key((*part).to_string())
                }
            })
            .collect();
        let root = (*root).to_string();

        Ok(Self { root, rest })
    }

    /// Returns the context key the path starts at.
    #[must_use]
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns the segments after the root key.
    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.rest
    }

    fn prefix(&self, depth: usize) -> String {
        std::iter::once(self.root.clone())
            .chain(self.rest[..depth].iter().map(ToString::to_string))
            .collect::<Vec<_>>()
            .join(".")
    }

    fn lookup<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.rest.iter().try_fold(root, |value, segment| match segment {
            PathSegment::Key(key) => value.as_object()?.get(key),
            PathSegment::Index(index) => value.as_array()?.get(*index),
        })
    }

    fn assign(&self, root: &mut Value, new_value: Value) -> Result<(), PathError> {
        let Some((last, parents)) = self.rest.split_last() else {
            *root = new_value;
            return Ok(());
        };

        let mut current = root;
        for (depth, segment) in parents.iter().enumerate() {
            current = self.child_mut(current, segment, depth)?;
        }

        let depth = parents.len();
        match last {
            PathSegment::Key(key) => {
                if current.is_null() {
                    *current = Value::Object(Map::new());
                }
                let object = current.as_object_mut().ok_or_else(|| PathError::NotAContainer {
                    at: self.prefix(depth),
                    expected: "object",
                })?;
                object.insert(key.clone(), new_value);
            }
            PathSegment::Index(index) => {
                let array = current.as_array_mut().ok_or_else(|| PathError::NotAContainer {
                    at: self.prefix(depth),
                    expected: "array",
                })?;
                let len = array.len();
                let slot = array.get_mut(*index).ok_or_else(|| PathError::IndexOutOfRange {
                    at: self.prefix(depth),
                    index: *index,
                    len,
                })?;
                *slot = new_value;
            }
        }
        Ok(())
    }

    fn child_mut<'v>(
        &self,
        value: &'v mut Value,
        segment: &PathSegment,
        depth: usize,
    ) -> Result<&'v mut Value, PathError> {
        match segment {
            PathSegment::Key(key) => {
                if value.is_null() {
                    *value = Value::Object(Map::new());
                }
                let object = value.as_object_mut().ok_or_else(|| PathError::NotAContainer {
                    at: self.prefix(depth),
                    expected: "object",
                })?;
                Ok(object
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new())))
            }
            PathSegment::Index(index) => {
                let array = value.as_array_mut().ok_or_else(|| PathError::NotAContainer {
                    at: self.prefix(depth),
                    expected: "array",
                })?;
                let len = array.len();
                array.get_mut(*index).ok_or_else(|| PathError::IndexOutOfRange {
                    at: self.prefix(depth),
                    index: *index,
                    len,
                })
            }
        }
    }
}

impl FromStr for KeyPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.prefix(self.rest.len()))
    }
}

impl Context {
    /// Reads a nested value. Missing members, out-of-range indices and
    /// scalars along the way all yield `None`.
    #[must_use]
    pub fn get_path(&self, path: &KeyPath) -> Option<Value> {
        let root = self.get(path.root())?;
        path.lookup(&root).cloned()
    }

    /// Writes a nested value, creating intermediate objects as needed.
    ///
    /// The branch's view is only touched when the whole path resolves.
    ///
    /// # Errors
    ///
    /// Returns `PathError::NotAContainer` when a segment meets a scalar or the
    /// wrong container kind, and `PathError::IndexOutOfRange` for an index
    /// past the end of an array.
    pub fn set_path(&self, path: &KeyPath, value: impl Into<Value>) -> Result<(), PathError> {
        let mut root = self.get(path.root()).unwrap_or(Value::Null);
        path.assign(&mut root, value.into())?;
        self.set(path.root(), root);
        Ok(())
    }
}
