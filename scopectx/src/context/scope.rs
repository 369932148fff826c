//! Scoped acquisition of named contexts with guaranteed release.

use super::branch::Branch;
use super::{Context, ContextManager};
use serde_json::{Map, Value};
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

/// A registered context that is unregistered when the guard goes away.
///
/// Release happens exactly once, on whichever comes first: [`ScopedContext::close`],
/// normal drop, drop during panic unwinding, or drop of a cancelled future
/// holding the guard. Release also drops the data the entering branch holds
/// for the context. A name that was meanwhile deleted and re-registered by
/// someone else is left alone.
#[must_use = "the context is unregistered as soon as the guard is dropped"]
pub struct ScopedContext<'m> {
    manager: &'m ContextManager,
    context: Context,
    branch: Arc<Branch>,
    released: bool,
}

impl ScopedContext<'_> {
    /// Returns the scoped context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Releases the registration now.
    ///
    /// Returns whether the registration was still present.
    pub fn close(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.released = true;
        let removed = self
            .manager
            .delete_if_same(self.context.name(), &self.context);
        self.branch.reset(self.context.id());
        debug!(context = self.context.name(), removed, "Context scope exited");
        removed
    }
}

impl Deref for ScopedContext<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.context
    }
}

impl Drop for ScopedContext<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ScopedContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedContext")
            .field("context", &self.context)
            .field("released", &self.released)
            .finish()
    }
}

impl ContextManager {
    /// Gets or creates `name`, applies `initial`, and returns a release guard.
    ///
    /// Callers expecting overlapping scopes should pick distinct names, for
    /// example with [`generate_scope_name`](crate::utils::generate_scope_name);
    /// scopes sharing a name share one context.
    pub fn scope(&self, name: &str, initial: Option<Map<String, Value>>) -> ScopedContext<'_> {
        let context = self.get_or_create_context(name);
        if let Some(initial) = initial {
            context.update(initial);
        }
        debug!(context = name, "Context scope entered");

        ScopedContext {
            manager: self,
            context,
            branch: Branch::current(),
            released: false,
        }
    }

    /// Runs `f` with a scoped context, unregistering it on every exit path.
    pub fn context_scope<R>(
        &self,
        name: &str,
        initial: Option<Map<String, Value>>,
        f: impl FnOnce(&Context) -> R,
    ) -> R {
        let scope = self.scope(name, initial);
        f(scope.context())
    }

    /// Awaits the future built by `f` with a scoped context.
    ///
    /// The registration is removed when the future completes, fails, panics,
    /// or is dropped before completion. A caller already inside an entered
    /// branch keeps using it; any other caller, such as a plain
    /// `tokio::spawn` task, runs the scope in a fork of its current branch so
    /// concurrent scopes on one worker thread stay isolated.
    pub async fn async_context_scope<F, Fut, R>(
        &self,
        name: &str,
        initial: Option<Map<String, Value>>,
        f: F,
    ) -> R
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = R>,
    {
        let branch = Branch::entered().unwrap_or_else(|| Branch::current().fork());
        branch
            .enter(async move {
                let scope = self.scope(name, initial);
                f(scope.context().clone()).await
            })
            .await
    }
}
