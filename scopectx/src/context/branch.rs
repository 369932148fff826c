//! Branch-local storage backing every [`Context`](super::Context).
//!
//! A branch is one logical unit of execution: an OS thread, or a tokio task
//! entered through [`spawn_branch`] / [`with_branch`]. Each branch owns a map
//! from context id to a shared snapshot pointer. Forking a branch copies the
//! pointers, so parent and child start with the same data and diverge on the
//! first write. Writes never merge back.

use super::snapshot::Snapshot;
use super::store::{Context, ContextInner};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

tokio::task_local! {
    static TASK_BRANCH: Arc<Branch>;
}

thread_local! {
    static THREAD_BRANCH: Arc<Branch> = Arc::new(Branch::root());
}

static BRANCH_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_branch_id() -> u64 {
    BRANCH_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A branch's data for one context. Entries whose context has been dropped
/// everywhere are pruned on the next fork or first write to another context.
#[derive(Debug, Clone)]
struct View {
    owner: Weak<ContextInner>,
    snapshot: Arc<Snapshot>,
}

impl View {
    fn is_live(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

/// An isolated set of context views.
#[derive(Debug)]
pub struct Branch {
    id: u64,
    parent: Option<u64>,
    views: Mutex<HashMap<u64, View>>,
}

impl Branch {
    fn root() -> Self {
        Self {
            id: next_branch_id(),
            parent: None,
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the branch the caller is executing in.
    ///
    /// Inside a task or closure entered through this module that is the
    /// entered branch; anywhere else it is the current thread's root branch.
    #[must_use]
    pub fn current() -> Arc<Self> {
        TASK_BRANCH
            .try_with(Arc::clone)
            .unwrap_or_else(|_| THREAD_BRANCH.with(Arc::clone))
    }

    /// Creates a child branch starting from this branch's current views.
    #[must_use]
    pub fn fork(&self) -> Arc<Self> {
        let views = {
            let mut views = self.views.lock();
            views.retain(|_, view| view.is_live());
            views.clone()
        };
        let child = Arc::new(Self {
            id: next_branch_id(),
            parent: Some(self.id),
            views: Mutex::new(views),
        });
        tracing::trace!(branch = child.id, parent = self.id, "Forked branch");
        child
    }

    /// Returns the branch id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the id of the branch this one was forked from.
    #[must_use]
    pub fn parent_id(&self) -> Option<u64> {
        self.parent
    }

    /// Runs a closure with this branch as the current branch.
    pub fn run<R>(self: &Arc<Self>, f: impl FnOnce() -> R) -> R {
        TASK_BRANCH.sync_scope(Arc::clone(self), f)
    }

    /// Drives a future with this branch as the current branch.
    pub async fn enter<F: Future>(self: Arc<Self>, fut: F) -> F::Output {
        TASK_BRANCH.scope(self, fut).await
    }

    /// Returns the branch entered by the current task or closure, if any.
    pub(crate) fn entered() -> Option<Arc<Self>> {
        TASK_BRANCH.try_with(Arc::clone).ok()
    }

    pub(crate) fn view(&self, context_id: u64) -> Option<Arc<Snapshot>> {
        self.views
            .lock()
            .get(&context_id)
            .map(|view| Arc::clone(&view.snapshot))
    }

    /// Applies a write to this branch's view of a context.
    ///
    /// The pointer swap happens under the branch lock; the closure must not
    /// touch any context.
    pub(crate) fn modify<R>(&self, context: &Context, f: impl FnOnce(&mut Snapshot) -> R) -> R {
        let mut views = self.views.lock();
        if !views.contains_key(&context.id()) {
            views.retain(|_, view| view.is_live());
        }
        let view = views.entry(context.id()).or_insert_with(|| View {
            owner: context.downgrade(),
            snapshot: Arc::default(),
        });
        f(Arc::make_mut(&mut view.snapshot))
    }

    /// Like [`Branch::modify`], but only when `guard` accepts the current view.
    /// Avoids copying a shared snapshot for a write that would change nothing.
    pub(crate) fn modify_if<R>(
        &self,
        context_id: u64,
        guard: impl FnOnce(&Snapshot) -> bool,
        f: impl FnOnce(&mut Snapshot) -> R,
    ) -> Option<R> {
        let mut views = self.views.lock();
        let view = views.get_mut(&context_id)?;
        if !guard(&view.snapshot) {
            return None;
        }
        Some(f(Arc::make_mut(&mut view.snapshot)))
    }

    /// Drops this branch's view of a context, leaving it empty.
    pub(crate) fn reset(&self, context_id: u64) {
        self.views.lock().remove(&context_id);
    }

    /// Number of context views this branch holds.
    pub(crate) fn view_count(&self) -> usize {
        self.views.lock().len()
    }
}

/// Spawns a tokio task running in a fork of the current branch.
pub fn spawn_branch<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let branch = Branch::current().fork();
    tokio::spawn(TASK_BRANCH.scope(branch, fut))
}

/// Drives a future in a fork of the current branch.
pub async fn with_branch<F: Future>(fut: F) -> F::Output {
    Branch::current().fork().enter(fut).await
}

/// Runs a closure in a fork of the current branch.
pub fn run_in_branch<R>(f: impl FnOnce() -> R) -> R {
    Branch::current().fork().run(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_current_is_stable_on_thread() {
        let a = Branch::current();
        let b = Branch::current();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_threads_get_distinct_roots() {
        let here = Branch::current().id();
        let there = std::thread::spawn(|| Branch::current().id()).join().unwrap();
        assert_ne!(here, there);
    }

    #[test]
    fn test_run_switches_current() {
        let branch = Branch::current().fork();
        let seen = branch.run(|| Branch::current().id());
        assert_eq!(seen, branch.id());
        assert_eq!(branch.parent_id(), Some(Branch::current().id()));
    }

    #[test]
    fn test_fork_copy_on_write() {
        let ctx = Context::new("cow");
        let parent = Branch::current().fork();
        parent.modify(&ctx, |s| s.insert("k".to_string(), json!(1)));

        let child = parent.fork();
        child.modify(&ctx, |s| s.insert("k".to_string(), json!(2)));

        assert_eq!(parent.view(ctx.id()).unwrap().get("k"), Some(&json!(1)));
        assert_eq!(child.view(ctx.id()).unwrap().get("k"), Some(&json!(2)));
    }

    #[test]
    fn test_held_snapshot_is_point_in_time() {
        let ctx = Context::new("held");
        let branch = Branch::current().fork();
        branch.modify(&ctx, |s| s.insert("k".to_string(), json!("old")));

        let held = branch.view(ctx.id()).unwrap();
        branch.modify(&ctx, |s| s.insert("k".to_string(), json!("new")));

        assert_eq!(held.get("k"), Some(&json!("old")));
        assert_eq!(branch.view(ctx.id()).unwrap().get("k"), Some(&json!("new")));
    }

    #[test]
    fn test_modify_if_skips_missing_view() {
        let branch = Branch::current().fork();
        let result = branch.modify_if(u64::MAX, |_| true, |s| s.len());
        assert_eq!(result, None);
        assert!(branch.view(u64::MAX).is_none());
    }

    #[test]
    fn test_dropped_context_views_are_pruned() {
        let branch = Arc::new(Branch::root());
        let kept = Context::new("kept");
        branch.modify(&kept, |s| s.insert("k".to_string(), json!(1)));
        {
            let gone = Context::new("gone");
            branch.modify(&gone, |s| s.insert("k".to_string(), json!(2)));
        }
        assert_eq!(branch.view_count(), 2);

        // First write to a new context prunes views of dropped ones.
        let fresh = Context::new("fresh");
        branch.modify(&fresh, |s| s.insert("k".to_string(), json!(3)));
        assert_eq!(branch.view_count(), 2);
        assert!(branch.view(kept.id()).is_some());

        drop(fresh);
        assert_eq!(branch.fork().view_count(), 1);
        assert_eq!(branch.view_count(), 1);
    }

    #[test]
    fn test_entered_only_inside_run() {
        assert!(Branch::entered().is_none());
        let branch = Branch::current().fork();
        let inside = branch.run(|| Branch::entered().map(|b| b.id()));
        assert_eq!(inside, Some(branch.id()));
    }

    #[tokio::test]
    async fn test_spawn_branch_inherits_but_does_not_leak() {
        let ctx = Context::new("spawned");
        let branch = Branch::current().fork();
        branch.modify(&ctx, |s| s.insert("k".to_string(), json!("parent")));

        let parent = branch.clone();
        let child_ctx = ctx.clone();
        let child_value = parent
            .enter(async move {
                spawn_branch(async move {
                    let current = Branch::current();
                    let inherited = current.view(child_ctx.id()).unwrap().get("k").cloned();
                    current.modify(&child_ctx, |s| s.insert("k".to_string(), json!("child")));
                    inherited
                })
                .await
                .unwrap()
            })
            .await;

        assert_eq!(child_value, Some(json!("parent")));
        assert_eq!(branch.view(ctx.id()).unwrap().get("k"), Some(&json!("parent")));
    }
}
