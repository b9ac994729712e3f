//! Bounded retry with exponential backoff for transient failures.
//!
//! Used by the reassignment cascade, where each pending order is moved in its
//! own transaction and a lock timeout or dropped connection should not leave
//! the order bound to a deactivated consultant.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use tripdesk_core::EngineError;
//! use tripdesk_runtime::retry::{retry_transient, RetryPolicy};
//!
//! # async fn example() -> Result<(), EngineError> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(3)
//!     .initial_delay(Duration::from_millis(100))
//!     .build();
//!
//! let value = retry_transient(&policy, "ORD-1", || async { Ok::<_, EngineError>(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tripdesk_core::EngineError;

/// Exponential backoff for per-item cascade retries.
///
/// Defaults: 3 retries, 100ms first delay doubling up to 5s.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Growth factor between delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }

    /// Delay before retry number `retry` (zero-based), capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn backoff(&self, retry: usize) -> Duration {
        let factor = self.multiplier.powi(retry.min(32) as i32);
        let delay_ms = self.initial_delay.as_millis() as f64 * factor;
        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: usize,
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set delay before the first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the cap on any single delay.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub const fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
        }
    }
}

/// Run one cascade item, retrying while the failure is transient.
///
/// `item` names the unit of work in logs (an order code for the cascade).
/// Conflicts and validation failures return at once; transient failures are
/// retried up to `policy.max_retries` times, after which the last error is
/// returned.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry_transient<F, Fut, T>(
    policy: &RetryPolicy,
    item: &str,
    mut operation: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut retries = 0;

    loop {
        let err = match operation().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(item, retries, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_retryable() || retries >= policy.max_retries {
            return Err(err);
        }

        let delay = policy.backoff(retries);
        tracing::warn!(
            item,
            retries,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "Transient failure, retrying"
        );
        sleep(delay).await;
        retries += 1;
    }
}
