//! Retrying fallible async work with exponential backoff.
//!
//! Persistence effects wrap their write in [`retry_with_predicate`]: a
//! transient failure (I/O hiccup, busy backend) is tried again after a
//! growing pause, anything else fails on the spot.
//!
//! ```rust
//! use liststate_runtime::retry::{retry_with_predicate, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<u32, String> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(2)
//!     .initial_delay(Duration::from_millis(20))
//!     .build();
//!
//! let value = retry_with_predicate(
//!     &policy,
//!     || async { Ok::<_, String>(7) },
//!     |error: &String| error.starts_with("busy"),
//! )
//! .await?;
//! # Ok(value)
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

/// How often and how patiently to retry
///
/// Defaults: 3 retries, first pause 50 ms, doubling, never above 2 s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Pause before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any pause
    pub max_delay: Duration,
    /// Growth factor between consecutive pauses
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Builder starting from [`RetryPolicy::default`]
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder(Self::default())
    }

    /// Single attempt, no retries
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Pause before retry number `retry` (zero-based), saturating at `max_delay`
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        self.multiplier
            .checked_pow(retry)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Builder for [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder(RetryPolicy);

impl RetryPolicyBuilder {
    /// Retries after the first attempt
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.0.max_retries = max_retries;
        self
    }

    /// Pause before the first retry
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.0.initial_delay = delay;
        self
    }

    /// Upper bound for any pause
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.0.max_delay = delay;
        self
    }

    /// Growth factor between pauses
    #[must_use]
    pub const fn multiplier(mut self, multiplier: u32) -> Self {
        self.0.multiplier = multiplier;
        self
    }

    /// Finishes the policy
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.0
    }
}

/// Runs `operation` until it succeeds, fails permanently, or retries run out
///
/// After each failure `is_transient` decides whether another attempt is
/// worth it.
///
/// # Errors
///
/// Returns the first error `is_transient` rejects, or the last error once
/// `policy.max_retries` retries have failed.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_transient: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut retry = 0;
    loop {
        let error = match operation().await {
            Ok(value) => {
                if retry > 0 {
                    tracing::info!(retries = retry, "Succeeded after retrying");
                }
                return Ok(value);
            },
            Err(error) => error,
        };

        if !is_transient(&error) {
            tracing::warn!(%error, "Permanent failure, not retrying");
            return Err(error);
        }
        if retry >= policy.max_retries {
            tracing::error!(retries = retry, %error, "Giving up");
            return Err(error);
        }

        let delay = policy.delay_for_attempt(retry);
        tracing::warn!(retry, delay_ms = delay.as_millis(), %error, "Transient failure, retrying");
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick(max_retries: u32) -> RetryPolicy {
        RetryPolicy::builder()
            .max_retries(max_retries)
            .initial_delay(Duration::from_millis(1))
            .build()
    }

    /// Fails with `errors` in order, then succeeds with the attempt number
    async fn scripted(calls: &AtomicU32, errors: &[&'static str]) -> Result<u32, &'static str> {
        let call = calls.fetch_add(1, Ordering::SeqCst);
        errors.get(call as usize).map_or(Ok(call), |error| Err(*error))
    }

    #[test]
    fn delays_double_up_to_the_cap() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500))
            .build();

        let delays: Vec<_> = (0..5).map(|retry| policy.delay_for_attempt(retry)).collect();
        assert_eq!(
            delays,
            [100, 200, 400, 500, 500].map(Duration::from_millis)
        );
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let calls = AtomicU32::new(0);

        let result = retry_with_predicate(
            &quick(3),
            || scripted(&calls, &["busy", "busy"]),
            |_| true,
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);

        let result =
            retry_with_predicate(&quick(1), || scripted(&calls, &["busy"; 4]), |_| true).await;

        assert_eq!(result, Err("busy"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let calls = AtomicU32::new(0);

        let result = retry_with_predicate(
            &quick(5),
            || scripted(&calls, &["busy", "corrupt", "busy"]),
            |error: &&str| *error == "busy",
        )
        .await;

        assert_eq!(result, Err("corrupt"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn none_policy_tries_once() {
        let calls = AtomicU32::new(0);

        let result =
            retry_with_predicate(&RetryPolicy::none(), || scripted(&calls, &["busy"]), |_| true)
                .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
