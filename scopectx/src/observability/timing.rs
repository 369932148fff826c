//! Elapsed-time wrappers that log through `tracing`.

use std::future::Future;
use std::time::{Duration, Instant};

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span, logs it at debug level and returns the duration.
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        tracing::debug!(
            span_name = %self.name,
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            "{} took {:.4}s", self.name, elapsed.as_secs_f64()
        );
        elapsed
    }
}

/// Runs `f` and returns its result with the time it took.
pub fn timed<R>(name: &str, f: impl FnOnce() -> R) -> (R, Duration) {
    let timer = SpanTimer::start(name);
    let value = f();
    (value, timer.finish())
}

/// Awaits `fut` and returns its output with the time it took.
pub async fn timed_async<F: Future>(name: &str, fut: F) -> (F::Output, Duration) {
    let timer = SpanTimer::start(name);
    let value = fut.await;
    (value, timer.finish())
}
