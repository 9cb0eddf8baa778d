// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transparent retry with exponential backoff for transient KV errors:
//! up to 8 attempts, 100ms doubling to a 3s cap.

use joshua_core::JoshuaError;
use std::future::Future;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 8;
const INITIAL_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_secs(3);

/// Retry `op` while it returns a transient [`JoshuaError`], with
/// exponential backoff. Non-transient errors (and the final attempt's
/// error) are returned immediately.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, JoshuaError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, JoshuaError>>,
{
    let mut delay = INITIAL_DELAY;
    for attempt in 1..=MAX_ATTEMPTS {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying transient kv error");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("loop always returns on the final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let attempts = AtomicU32::new(0);
        let result = with_retry(|| {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(JoshuaError::Conflict)
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_transient_errors() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), JoshuaError> = with_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(JoshuaError::NotFound("x".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), JoshuaError> = with_retry(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async move { Err(JoshuaError::Conflict) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }
}
