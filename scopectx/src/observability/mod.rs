//! Logging setup and timing helpers.

mod logging;
mod timing;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use timing::{timed, timed_async, SpanTimer};
