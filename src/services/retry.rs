//! Bounded retry with exponential backoff for transient collaborator
//! failures.

use std::future::Future;

use tokio::time::Duration;
use tracing::debug;

use crate::config::RetryPolicy;

/// Run `op` until it succeeds, the error is not retryable, or the attempt
/// budget is exhausted. The delay doubles per retry starting from the
/// policy's base.
pub async fn with_backoff<T, E, F, Fut, R>(policy: &RetryPolicy, mut op: F, retryable: R) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if retryable(&e) && attempt + 1 < policy.max_attempts.max(1) => {
                let delay =
                    Duration::from_millis(policy.base_backoff_ms.saturating_mul(1 << attempt.min(16)));
                debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %e, "retrying after transient failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_backoff(
            &policy(3),
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(n)
                    }
                }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_backoff(
            &policy(3),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("still down".to_string()) }
            },
            |_| true,
        )
        .await;

        assert_eq!(result.unwrap_err(), "still down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = with_backoff(
            &policy(5),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("permanent".to_string()) }
            },
            |e| e != "permanent",
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
