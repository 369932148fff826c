//! Process-wide registry, the reserved global context, and the helpers
//! built on them.

use super::branch::Branch;
use super::{Context, ContextManager};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::{Arc, OnceLock};

/// Name of the reserved global context.
pub const GLOBAL_CONTEXT_NAME: &str = "global";

static DEFAULT_MANAGER: OnceLock<Arc<ContextManager>> = OnceLock::new();
static GLOBAL_CONTEXT: OnceLock<Context> = OnceLock::new();

/// Returns the process-wide registry, creating it on first use.
pub fn default_manager() -> Arc<ContextManager> {
    DEFAULT_MANAGER
        .get_or_init(|| Arc::new(ContextManager::new()))
        .clone()
}

/// Gets or creates `name` in the process-wide registry.
pub fn get_context(name: &str) -> Context {
    default_manager().get_or_create_context(name)
}

/// Returns the reserved global context.
///
/// It is held outside the registry, so `clear_all` on the default manager
/// does not detach it.
pub fn global_context() -> Context {
    GLOBAL_CONTEXT
        .get_or_init(|| Context::new(GLOBAL_CONTEXT_NAME))
        .clone()
}

/// Sets a value in the global context.
pub fn set_global(key: impl Into<String>, value: impl Into<Value>) {
    global_context().set(key, value);
}

/// Gets a value from the global context.
pub fn get_global(key: &str) -> Option<Value> {
    global_context().get(key)
}

/// Gets a value from the global context, or `default` if absent.
pub fn get_global_or(key: &str, default: impl Into<Value>) -> Value {
    global_context().get_or(key, default)
}

/// Clears the current branch's view of the global context.
pub fn clear_global() {
    global_context().clear();
}

/// Runs `f` with a context scoped in the process-wide registry.
///
/// # Examples
///
/// ```
/// use scopectx::context::{context_scope, default_manager};
///
/// let mut initial = serde_json::Map::new();
/// initial.insert("user_id".to_string(), 123.into());
///
/// let user = context_scope("doc-request", Some(initial), |ctx| {
///     ctx.set("action", "login");
///     ctx.get("user_id")
/// });
///
/// assert_eq!(user, Some(serde_json::json!(123)));
/// assert!(default_manager().get_context("doc-request").is_none());
/// ```
pub fn context_scope<R>(
    name: &str,
    initial: Option<Map<String, Value>>,
    f: impl FnOnce(&Context) -> R,
) -> R {
    default_manager().context_scope(name, initial, f)
}

/// Awaits the future built by `f` with a context scoped in the process-wide
/// registry.
pub async fn async_context_scope<F, Fut, R>(
    name: &str,
    initial: Option<Map<String, Value>>,
    f: F,
) -> R
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = R>,
{
    let manager = default_manager();
    manager.async_context_scope(name, initial, f).await
}

/// Runs `f` against `ctx` in a fork of the current branch.
///
/// `f` starts from the caller's view of `ctx`; whatever it writes stays in
/// the fork.
pub fn run_in_context<R>(ctx: &Context, f: impl FnOnce(&Context) -> R) -> R {
    Branch::current().fork().run(|| f(ctx))
}

/// Future form of [`run_in_context`].
pub async fn run_in_context_async<F, Fut, R>(ctx: &Context, f: F) -> R
where
    F: FnOnce(Context) -> Fut,
    Fut: Future<Output = R>,
{
    let ctx = ctx.clone();
    Branch::current()
        .fork()
        .enter(async move { f(ctx).await })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_get_global() {
        set_global("test_key", "test_value");
        assert_eq!(get_global("test_key"), Some(json!("test_value")));
    }

    #[test]
    fn test_get_global_default() {
        assert_eq!(get_global_or("missing_key", "default"), json!("default"));
        assert_eq!(get_global("missing_key"), None);
    }

    #[test]
    fn test_clear_global() {
        set_global("test_key_clear", "value");
        clear_global();
        assert_eq!(get_global("test_key_clear"), None);
    }

    #[test]
    fn test_global_context_is_singleton() {
        let a = global_context();
        let b = global_context();
        assert!(a.ptr_eq(&b));
        assert_eq!(a.name(), GLOBAL_CONTEXT_NAME);
    }

    #[test]
    fn test_global_is_not_registered() {
        global_context();
        assert!(!default_manager().contains(GLOBAL_CONTEXT_NAME));
    }

    #[test]
    fn test_get_context_is_get_or_create() {
        let a = get_context("global_rs_shared");
        let b = get_context("global_rs_shared");
        assert!(a.ptr_eq(&b));
        default_manager().delete_context("global_rs_shared");
    }

    #[test]
    fn test_run_in_context_returns_value() {
        let ctx = Context::new("run_test");
        let result = run_in_context(&ctx, |_| 21 * 2);
        assert_eq!(result, 42);
    }

    #[test]
    fn test_run_in_context_isolates_writes() {
        let ctx = Context::new("run_isolated");
        ctx.set("seen", "outer");

        let inner = run_in_context(&ctx, |ctx| {
            let before = ctx.get("seen");
            ctx.set("seen", "inner");
            before
        });

        assert_eq!(inner, Some(json!("outer")));
        assert_eq!(ctx.get("seen"), Some(json!("outer")));
    }

    #[tokio::test]
    async fn test_run_in_context_async() {
        let ctx = Context::new("run_async");
        ctx.set("n", 1);

        let seen = run_in_context_async(&ctx, |ctx| async move {
            tokio::task::yield_now().await;
            ctx.set("n", 2);
            ctx.get("n")
        })
        .await;

        assert_eq!(seen, Some(json!(2)));
        assert_eq!(ctx.get("n"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_async_context_scope_default_manager() {
        let mut initial = Map::new();
        initial.insert("key".to_string(), json!("value"));

        let value = async_context_scope("global_rs_async", Some(initial), |ctx| async move {
            ctx.set("other", 1);
            ctx.get("key")
        })
        .await;

        assert_eq!(value, Some(json!("value")));
        assert!(default_manager().get_context("global_rs_async").is_none());
    }
}
