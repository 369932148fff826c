//! Branch-isolated runtime context store.
//!
//! This module provides:
//! - The branch primitive giving each thread or entered task its own views
//! - Named contexts with copy-on-write, branch-local data
//! - A registry of named contexts and scoped acquisition helpers
//! - A process-wide registry and reserved global context

mod branch;
mod global;
mod manager;
mod path;
mod scope;
mod snapshot;
mod store;

pub use branch::{run_in_branch, spawn_branch, with_branch, Branch};
pub use global::{
    async_context_scope, clear_global, context_scope, default_manager, get_context, get_global,
    get_global_or, global_context, run_in_context, run_in_context_async, set_global,
    GLOBAL_CONTEXT_NAME,
};
pub use manager::ContextManager;
pub use path::{KeyPath, PathSegment};
pub use scope::ScopedContext;
pub use store::Context;
