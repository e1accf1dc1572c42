//! Exponential back-off with jitter for transient `StockX` failures.
//!
//! The request loop in [`crate::client`] drives its own counters and only
//! asks [`RetryPolicy`] for delays. [`retry_with_backoff`] wraps simpler
//! one-shot operations such as the OAuth refresh call.

use std::future::Future;
use std::time::Duration;

use crate::error::StockxError;

const MAX_DELAY_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_retries: u32, backoff_base_ms: u64) -> Self {
        Self {
            max_retries,
            backoff_base_ms,
        }
    }

    /// Upper bound of the delay before retry number `attempt` (1-based),
    /// before jitter is applied.
    #[must_use]
    pub fn ceiling_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        let computed = self.backoff_base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(computed.min(MAX_DELAY_MS))
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`
    /// capped at 60 s, then scaled by a random factor in `[0.75, 1.25)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let capped = self.ceiling_for(attempt).as_millis();
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        Duration::from_millis(delay_ms)
    }
}

/// Returns `true` for failures worth another attempt: timeouts, connection
/// errors, and 5xx responses that were folded into [`StockxError::Transient`].
pub(crate) fn is_retriable(err: &StockxError) -> bool {
    match err {
        StockxError::Http(e) => e.is_timeout() || e.is_connect(),
        StockxError::Transient { .. } => true,
        _ => false,
    }
}

/// Runs `operation` with up to `policy.max_retries` additional attempts on
/// retriable errors. Non-retriable errors are returned immediately.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut operation: F,
) -> Result<T, StockxError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StockxError>>,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !is_retriable(&err) || attempt >= policy.max_retries {
                    return Err(err);
                }
                attempt += 1;
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "{what}: transient error, retrying after back-off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn transient() -> StockxError {
        StockxError::Transient {
            url: "https://api.example/x".to_owned(),
            attempts: 1,
            reason: "HTTP 503".to_owned(),
        }
    }

    #[test]
    fn ceiling_doubles_per_attempt() {
        let policy = RetryPolicy::new(3, 500);
        assert_eq!(policy.ceiling_for(1), Duration::from_millis(500));
        assert_eq!(policy.ceiling_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.ceiling_for(3), Duration::from_millis(2_000));
    }

    #[test]
    fn ceiling_is_capped_at_one_minute() {
        let policy = RetryPolicy::new(30, 10_000);
        assert_eq!(policy.ceiling_for(20), Duration::from_millis(MAX_DELAY_MS));
    }

    #[test]
    fn jitter_stays_within_a_quarter_of_the_ceiling() {
        let policy = RetryPolicy::new(3, 1_000);
        for _ in 0..200 {
            let d = policy.delay_for(2).as_millis();
            assert!((1_500..=2_500).contains(&d), "delay {d}ms out of range");
        }
    }

    #[test]
    fn rejected_and_auth_errors_are_not_retriable() {
        assert!(!is_retriable(&StockxError::Authentication("bad".to_owned())));
        assert!(!is_retriable(&StockxError::Rejected {
            status: 400,
            url: "u".to_owned(),
            body: String::new(),
        }));
        assert!(is_retriable(&transient()));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result = retry_with_backoff(RetryPolicy::new(3, 100), "test", || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient())
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::new(2, 100), "test", || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(transient())
            }
        })
        .await;
        assert!(matches!(result, Err(StockxError::Transient { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_authentication_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let result: Result<(), _> = retry_with_backoff(RetryPolicy::new(3, 0), "test", || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(StockxError::Authentication("invalid_grant".to_owned()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
