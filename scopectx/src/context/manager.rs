//! Registry of named contexts.

use super::Context;
use crate::errors::ContextError;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct Registry {
    contexts: HashMap<String, (u64, Context)>,
    next_seq: u64,
}

impl Registry {
    fn insert(&mut self, name: &str, ctx: Context) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.contexts.insert(name.to_string(), (seq, ctx));
    }
}

/// The set of live named contexts for a process or subsystem.
///
/// All registry mutation is serialized behind one lock. No context method is
/// called while that lock is held.
///
/// # Examples
///
/// ```
/// use scopectx::context::ContextManager;
///
/// let manager = ContextManager::new();
/// let ctx = manager.create_context("request").unwrap();
/// ctx.set("user", "alice");
///
/// let again = manager.get_context("request").unwrap();
/// assert_eq!(again.get("user"), Some(serde_json::json!("alice")));
/// assert!(manager.create_context("request").is_err());
/// ```
#[derive(Debug, Default)]
pub struct ContextManager {
    registry: RwLock<Registry>,
}

impl ContextManager {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a new context.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::DuplicateName` if `name` is already registered;
    /// the existing context is left untouched.
    pub fn create_context(&self, name: &str) -> Result<Context, ContextError> {
        let mut registry = self.registry.write();
        if registry.contexts.contains_key(name) {
            return Err(ContextError::duplicate_name(name));
        }

        let ctx = Context::new(name);
        registry.insert(name, ctx.clone());
        debug!(context = name, id = ctx.id(), "Context registered");
        Ok(ctx)
    }

    /// Returns the registered context, if any. Never creates one.
    #[must_use]
    pub fn get_context(&self, name: &str) -> Option<Context> {
        self.registry
            .read()
            .contexts
            .get(name)
            .map(|(_, ctx)| ctx.clone())
    }

    /// Returns the registered context, creating and registering it if absent.
    pub fn get_or_create_context(&self, name: &str) -> Context {
        if let Some(ctx) = self.get_context(name) {
            return ctx;
        }

        let mut registry = self.registry.write();
        if let Some((_, ctx)) = registry.contexts.get(name) {
            return ctx.clone();
        }

        let ctx = Context::new(name);
        registry.insert(name, ctx.clone());
        debug!(context = name, id = ctx.id(), "Context registered");
        ctx
    }

    /// Removes a registration. Returns whether it existed.
    pub fn delete_context(&self, name: &str) -> bool {
        let removed = self.registry.write().contexts.remove(name).is_some();
        if removed {
            debug!(context = name, "Context unregistered");
        }
        removed
    }

    /// Removes `name` only while it still refers to `ctx`.
    pub(crate) fn delete_if_same(&self, name: &str, ctx: &Context) -> bool {
        let mut registry = self.registry.write();
        let same = registry
            .contexts
            .get(name)
            .is_some_and(|(_, registered)| registered.ptr_eq(ctx));
        if same {
            registry.contexts.remove(name);
            debug!(context = name, id = ctx.id(), "Context unregistered");
        }
        same
    }

    /// Removes all registrations.
    pub fn clear_all(&self) {
        let mut registry = self.registry.write();
        let count = registry.contexts.len();
        registry.contexts.clear();
        debug!(count, "All contexts unregistered");
    }

    /// Returns the registered names in registration order.
    #[must_use]
    pub fn list_contexts(&self) -> Vec<String> {
        let registry = self.registry.read();
        let mut entries: Vec<_> = registry
            .contexts
            .iter()
            .map(|(name, (seq, _))| (*seq, name.clone()))
            .collect();
        entries.sort_unstable_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, name)| name).collect()
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.registry.read().contexts.contains_key(name)
    }

    /// Returns the number of registered contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.read().contexts.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.read().contexts.is_empty()
    }
}
