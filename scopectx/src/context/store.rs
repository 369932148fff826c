//! The named, branch-isolated [`Context`] store.

use super::branch::Branch;
use super::snapshot::Snapshot;
use crate::errors::ContextError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(1);

pub(crate) struct ContextInner {
    id: u64,
    name: String,
    created_at: DateTime<Utc>,
}

/// A named key/value store whose contents are local to the calling branch.
///
/// `Context` is a cheap handle; clones refer to the same context. The data
/// itself lives in the branch that wrote it (see [`Branch`]): a write made in
/// one branch is visible to that branch and to branches forked from it
/// afterwards, never to siblings or to branches forked earlier.
///
/// # Examples
///
/// ```
/// use scopectx::context::Context;
///
/// let ctx = Context::new("request");
/// ctx.set("user_id", 123);
/// assert_eq!(ctx.get("user_id"), Some(serde_json::json!(123)));
/// assert_eq!(ctx.get_or("missing", "default"), serde_json::json!("default"));
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Creates a new, empty context.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                created_at: Utc::now(),
            }),
        }
    }

    /// Returns the process-unique context id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns the context name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns when the context was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    /// Returns true if both handles refer to the same context.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    fn view(&self) -> Option<Arc<Snapshot>> {
        Branch::current().view(self.inner.id)
    }

    /// Stores a value under `key` in the current branch's view.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        tracing::trace!(context = %self.inner.name, key = %key, "Context set");
        Branch::current().modify(self, |snapshot| {
            snapshot.insert(key, value.into());
        });
    }

    /// Returns the value under `key`, if present in the current branch's view.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.view().and_then(|snapshot| snapshot.get(key).cloned())
    }

    /// Returns the value under `key`, or `default` if absent.
    #[must_use]
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Returns the value under `key` deserialized as `T`.
    ///
    /// Returns `None` when the key is absent or the value does not fit `T`.
    #[must_use]
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|value| serde_json::from_value(value).ok())
    }

    /// Strict lookup: fails when the key is absent.
    pub fn try_get(&self, key: &str) -> Result<Value, ContextError> {
        self.get(key)
            .ok_or_else(|| ContextError::key_not_found(self.name(), key))
    }

    /// Removes `key` from the current branch's view.
    ///
    /// Returns whether the key was present. Other branches holding the key
    /// keep it.
    pub fn delete(&self, key: &str) -> bool {
        self.remove_entry(key).is_some()
    }

    /// Strict removal: returns the removed value, or fails when absent.
    pub fn try_delete(&self, key: &str) -> Result<Value, ContextError> {
        self.remove_entry(key)
            .ok_or_else(|| ContextError::key_not_found(self.name(), key))
    }

    fn remove_entry(&self, key: &str) -> Option<Value> {
        Branch::current()
            .modify_if(
                self.inner.id,
                |snapshot| snapshot.contains_key(key),
                |snapshot| snapshot.remove(key),
            )
            .flatten()
    }

    /// Returns true if `key` is present in the current branch's view.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.view()
            .is_some_and(|snapshot| snapshot.contains_key(key))
    }

    /// Alias of [`Context::has`].
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.has(key)
    }

    /// Empties the current branch's view.
    pub fn clear(&self) {
        tracing::trace!(context = %self.inner.name, "Context cleared");
        Branch::current().reset(self.inner.id);
    }

    /// Returns all keys in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.view().map_or_else(Vec::new, |snapshot| {
            snapshot.ordered().into_iter().map(|(k, _)| k.clone()).collect()
        })
    }

    /// Returns all values in insertion order.
    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.view().map_or_else(Vec::new, |snapshot| {
            snapshot.ordered().into_iter().map(|(_, v)| v.clone()).collect()
        })
    }

    /// Returns all key/value pairs in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<(String, Value)> {
        self.view().map_or_else(Vec::new, |snapshot| {
            snapshot
                .ordered()
                .into_iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
    }

    /// Sets several entries with a single swap of the branch's view.
    ///
    /// Incoming values win on conflicting keys.
    pub fn update<K, V, I>(&self, entries: I)
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(String, Value)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        if entries.is_empty() {
            return;
        }

        tracing::trace!(context = %self.inner.name, count = entries.len(), "Context update");
        Branch::current().modify(self, |snapshot| {
            for (key, value) in entries {
                snapshot.insert(key, value);
            }
        });
    }

    /// Returns a copy of the current branch's view.
    #[must_use]
    pub fn to_dict(&self) -> Map<String, Value> {
        self.items().into_iter().collect()
    }

    /// Returns a copy of the current branch's view as a JSON object.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(self.to_dict())
    }

    /// Returns the number of entries in the current branch's view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.view().map_or(0, |snapshot| snapshot.len())
    }

    /// Returns true if the current branch's view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Context(name='{}', items={})", self.inner.name, self.len())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("items", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::run_in_branch;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_context_creation() {
        let ctx = Context::new("test_context");
        assert_eq!(ctx.name(), "test_context");
        assert_eq!(ctx.len(), 0);
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let ctx = Context::new("test_set_get");
        ctx.set("key", "value");
        assert_eq!(ctx.get("key"), Some(json!("value")));
    }

    #[test]
    fn test_get_default() {
        let ctx = Context::new("test_default");
        assert_eq!(ctx.get("missing"), None);
        assert_eq!(ctx.get_or("missing", "default"), json!("default"));
    }

    #[test]
    fn test_get_as_typed() {
        let ctx = Context::new("typed");
        ctx.set("count", 7);
        ctx.set("name", "alice");

        assert_eq!(ctx.get_as::<u32>("count"), Some(7));
        assert_eq!(ctx.get_as::<u32>("name"), None);
        assert_eq!(ctx.get_as::<String>("absent"), None);
    }

    #[test]
    fn test_delete_round_trip() {
        let ctx = Context::new("test_delete");
        ctx.set("key", "value");

        assert!(ctx.delete("key"));
        assert!(!ctx.delete("key"));
        assert_eq!(ctx.get("key"), None);
    }

    #[test]
    fn test_delete_missing() {
        let ctx = Context::new("test_delete_missing");
        assert!(!ctx.delete("missing"));
    }

    #[test]
    fn test_has_and_contains() {
        let ctx = Context::new("test_has");
        ctx.set("key", "value");
        assert!(ctx.has("key"));
        assert!(ctx.contains("key"));
        assert!(!ctx.has("missing"));
    }

    #[test]
    fn test_clear() {
        let ctx = Context::new("test_clear");
        ctx.set("key1", "value1");
        ctx.set("key2", "value2");
        ctx.clear();
        assert_eq!(ctx.len(), 0);
        assert_eq!(ctx.get("key1"), None);
    }

    #[test]
    fn test_keys_values_items_in_insertion_order() {
        let ctx = Context::new("test_kvi");
        ctx.set("b", 2);
        ctx.set("a", 1);
        ctx.set("b", 3);

        assert_eq!(ctx.keys(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(ctx.values(), vec![json!(3), json!(1)]);
        assert_eq!(
            ctx.items(),
            vec![("b".to_string(), json!(3)), ("a".to_string(), json!(1))]
        );
    }

    #[test]
    fn test_returned_collections_are_copies() {
        let ctx = Context::new("copies");
        ctx.set("a", 1);

        let mut keys = ctx.keys();
        keys.push("b".to_string());
        let mut dict = ctx.to_dict();
        dict.insert("c".to_string(), json!(3));

        assert_eq!(ctx.len(), 1);
        assert!(!ctx.has("c"));
    }

    #[test]
    fn test_update_overrides() {
        let ctx = Context::new("test_update");
        ctx.set("a", 0);
        ctx.update([("a", json!(1)), ("b", json!(2))]);

        assert_eq!(ctx.get("a"), Some(json!(1)));
        assert_eq!(ctx.get("b"), Some(json!(2)));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_to_dict() {
        let ctx = Context::new("test_to_dict");
        ctx.set("key", "value");
        assert_eq!(ctx.to_value(), json!({"key": "value"}));
    }

    #[test]
    fn test_strict_accessors() {
        let ctx = Context::new("test_strict");
        assert_eq!(
            ctx.try_get("missing"),
            Err(ContextError::key_not_found("test_strict", "missing"))
        );
        assert_eq!(ctx.get("missing"), None);

        ctx.set("key", "value");
        assert_eq!(ctx.try_get("key"), Ok(json!("value")));
        assert_eq!(ctx.try_delete("key"), Ok(json!("value")));
        assert!(ctx.try_delete("key").is_err());
    }

    #[test]
    fn test_empty_context_still_exists() {
        let ctx = Context::new("empty");
        ctx.set("k", 1);
        ctx.delete("k");
        assert!(ctx.is_empty());
        assert_eq!(ctx.to_value(), json!({}));
    }

    #[test]
    fn test_display() {
        let ctx = Context::new("shown");
        ctx.set("a", 1);
        assert_eq!(ctx.to_string(), "Context(name='shown', items=1)");
    }

    #[test]
    fn test_clones_share_identity() {
        let ctx = Context::new("same");
        let other = ctx.clone();
        other.set("k", 1);

        assert!(ctx.ptr_eq(&other));
        assert_eq!(ctx.get("k"), Some(json!(1)));
        assert!(!ctx.ptr_eq(&Context::new("same")));
    }

    #[test]
    fn test_delete_in_fork_keeps_parent_entry() {
        let ctx = Context::new("cow_delete");
        ctx.set("k", "v");

        let deleted = run_in_branch(|| {
            let deleted = ctx.delete("k");
            (deleted, ctx.has("k"))
        });

        assert_eq!(deleted, (true, false));
        assert!(ctx.has("k"));
    }

    #[test]
    fn test_clear_in_fork_keeps_parent_entries() {
        let ctx = Context::new("cow_clear");
        ctx.set("k", "v");

        run_in_branch(|| ctx.clear());

        assert_eq!(ctx.get("k"), Some(json!("v")));
    }

    #[test]
    fn test_thread_does_not_see_other_thread_writes() {
        let ctx = Context::new("threads");
        ctx.set("k", "main");

        let other = ctx.clone();
        let seen = std::thread::spawn(move || {
            let before = other.get("k");
            other.set("k", "worker");
            before
        })
        .join()
        .unwrap();

        assert_eq!(seen, None);
        assert_eq!(ctx.get("k"), Some(json!("main")));
    }
}
