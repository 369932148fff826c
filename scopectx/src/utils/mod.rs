//! Retry policy and naming helpers.

mod names;
mod retry;

pub use names::{generate_scope_name, generate_uuid};
pub use retry::{retry, retry_async, JitterStrategy, RetryOutcome, RetryPolicy};
