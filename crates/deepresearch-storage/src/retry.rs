//! Exponential backoff retry wrapper for state store operations:
//! "Writes use a short exponential backoff retry (e.g. 100ms, 200ms, 400ms,
//! capped at 2s, max 3 attempts) on transient contention errors. Only
//! transient errors are retried; all others propagate immediately."

use std::future::Future;
use std::time::Duration;

use crate::error::StorageError;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const BACKOFF_FACTOR: u32 = 2;
const MAX_BACKOFF: Duration = Duration::from_secs(2);
const MAX_ATTEMPTS: u32 = 3;

/// Run `op` up to [`MAX_ATTEMPTS`] times, backing off between attempts only
/// when the prior failure was [`StorageError::is_transient`]. Structural
/// errors propagate on the first attempt.
pub async fn with_retry<T, F, Fut>(mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut backoff = INITIAL_BACKOFF;
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                tracing::debug!(attempt, backoff_ms = backoff.as_millis() as u64, error = %err, "retrying transient storage error");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * BACKOFF_FACTOR).min(MAX_BACKOFF);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, StorageError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, StorageError> = with_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(StorageError::Transient("locked".into()))
                } else {
                    Ok(99)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, StorageError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::Transient("still locked".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn structural_errors_never_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<i32, StorageError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::Structural("bad column".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
