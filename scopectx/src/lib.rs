//! # Scopectx
//!
//! A scoped runtime context store: named key/value contexts whose data is
//! isolated per thread or per entered async task.
//!
//! - **Branch isolation**: every thread, and every task started with
//!   [`spawn_branch`](context::spawn_branch), sees its own copy-on-write view
//! - **Named contexts**: a [`ContextManager`](context::ContextManager) registry
//!   with scoped acquisition that always releases
//! - **Global layer**: a process-wide manager and a reserved global context
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use scopectx::prelude::*;
//!
//! set_global("request_id", "r-1");
//!
//! let role = context_scope("request", None, |ctx| {
//!     ctx.set("role", "admin");
//!     ctx.get("role")
//! });
//!
//! let handle = spawn_branch(async {
//!     // Inherits the caller's view; writes stay in this task.
//!     get_global("request_id")
//! });
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod errors;
pub mod observability;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{settings, Environment, Settings};
    pub use crate::context::{
        async_context_scope, clear_global, context_scope, default_manager, get_context,
        get_global, get_global_or, global_context, run_in_context, run_in_context_async,
        set_global, spawn_branch, with_branch, Branch, Context, ContextManager, KeyPath,
        ScopedContext,
    };
    pub use crate::errors::{ConfigError, ContextError, PathError, ScopectxError};
    pub use crate::observability::{init_logging, timed, timed_async, LoggingConfig};
    pub use crate::utils::{
        generate_scope_name, retry, retry_async, RetryOutcome, RetryPolicy,
    };
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use serde_json::json;

    #[test]
    fn prelude_covers_common_flow() {
        let name = generate_scope_name("lib");
        let value = context_scope(&name, None, |ctx| {
            ctx.set("k", 1);
            ctx.get("k")
        });

        assert_eq!(value, Some(json!(1)));
        assert!(!default_manager().contains(&name));
    }
}
