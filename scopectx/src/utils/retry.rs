//! Retry with multiplicative backoff.
//!
//! The policy is an explicit value and the result a typed outcome, so callers
//! decide what an exhausted retry means for them.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Jitter applied on top of the backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterStrategy {
    /// Exact backoff delay.
    #[default]
    None,
    /// Random from 0 to delay
    Full,
    /// Half fixed, half random
    Equal,
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(default = "default_delay", with = "duration_ms")]
    pub delay: Duration,
    /// Factor applied to the delay after each retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay", with = "duration_ms")]
    pub max_delay: Duration,
    /// Jitter strategy.
    #[serde(default)]
    pub jitter: JitterStrategy,
}

fn default_max_retries() -> u32 {
    3
}

fn default_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay: default_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay: default_max_delay(),
            jitter: JitterStrategy::default(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the backoff multiplier. Values below 1.0 are clamped to 1.0.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier.max(1.0);
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Total attempts including the first one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (0-based).
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let max_nanos = self.max_delay.as_nanos() as f64;
        let scaled = self.delay.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        let capped = if scaled.is_finite() {
            scaled.min(max_nanos)
        } else {
            max_nanos
        };

        let jittered = match self.jitter {
            JitterStrategy::None => capped,
            JitterStrategy::Full => {
                if capped <= 0.0 {
                    0.0
                } else {
                    rand::thread_rng().gen_range(0.0..=capped)
                }
            }
            JitterStrategy::Equal => {
                let half = capped / 2.0;
                if half <= 0.0 {
                    capped
                } else {
                    half + rand::thread_rng().gen_range(0.0..=half)
                }
            }
        };

        Duration::from_nanos(jittered.max(0.0).round() as u64)
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T, E> {
    /// The operation succeeded.
    Success {
        /// Returned value.
        value: T,
        /// Attempts made, including the successful one.
        attempts: u32,
    },
    /// Retries were exhausted or the error was not retryable.
    Failed {
        /// Error from the final attempt.
        last_error: E,
        /// Attempts made.
        attempts: u32,
    },
}

impl<T, E> RetryOutcome<T, E> {
    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Attempts made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }

    /// Converts into a plain `Result`, dropping the attempt count.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Failed { last_error, .. } => Err(last_error),
        }
    }
}

enum Step {
    Retry(Duration),
    Stop,
}

fn on_failure<E: Display>(policy: &RetryPolicy, attempt: u32, error: &E, retryable: bool) -> Step {
    if !retryable {
        tracing::warn!(attempt, error = %error, "Attempt failed with non-retryable error");
        return Step::Stop;
    }
    if attempt >= policy.max_attempts() {
        tracing::error!(attempts = attempt, error = %error, "Retries exhausted");
        return Step::Stop;
    }

    let delay = policy.delay_for(attempt - 1);
    tracing::warn!(
        attempt,
        max_attempts = policy.max_attempts(),
        delay_ms = delay.as_secs_f64() * 1000.0,
        error = %error,
        "Attempt failed, retrying"
    );
    Step::Retry(delay)
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the policy is exhausted. Sleeps the calling thread between
/// attempts.
pub fn retry<T, E, R, F>(policy: &RetryPolicy, is_retryable: R, mut operation: F) -> RetryOutcome<T, E>
where
    E: Display,
    R: Fn(&E) -> bool,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation() {
            Ok(value) => {
                return RetryOutcome::Success {
                    value,
                    attempts: attempt,
                }
            }
            Err(error) => match on_failure(policy, attempt, &error, is_retryable(&error)) {
                Step::Retry(delay) => std::thread::sleep(delay),
                Step::Stop => {
                    return RetryOutcome::Failed {
                        last_error: error,
                        attempts: attempt,
                    }
                }
            },
        }
    }
}

/// Async form of [`retry`], sleeping with `tokio::time::sleep`.
pub async fn retry_async<T, E, R, F, Fut>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    E: Display,
    R: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                return RetryOutcome::Success {
                    value,
                    attempts: attempt,
                }
            }
            Err(error) => match on_failure(policy, attempt, &error, is_retryable(&error)) {
                Step::Retry(delay) => tokio::time::sleep(delay).await,
                Step::Stop => {
                    return RetryOutcome::Failed {
                        last_error: error,
                        attempts: attempt,
                    }
                }
            },
        }
    }
}
