use std::future::Future;
use std::time::Duration;

use factline_core::Cancellation;
use rand::Rng;

use crate::error::StorageError;

const MAX_RETRIES: u32 = 3;
const BASE_DELAY: Duration = Duration::from_millis(500);
const BACKOFF_FACTOR: u32 = 2;

/// Runs `op` up to `MAX_RETRIES + 1` times with exponential backoff and
/// jitter in `[0.5x, 1.5x]`. Terminal errors (see [`StorageError::is_terminal`])
/// and caller cancellation both return immediately without further delay.
pub async fn with_retry<F, Fut, T>(cancel: &Cancellation, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_terminal() => return Err(e),
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    return Err(e);
                }
                tracing::warn!(attempt, error = %e, "object store operation failed, retrying");

                let delay = backoff_delay(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => return Err(StorageError::Cancelled),
                }
                attempt += 1;
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = BASE_DELAY.as_millis() as u64 * BACKOFF_FACTOR.pow(attempt) as u64;
    let jitter = rand::thread_rng().gen_range(0.5..=1.5);
    Duration::from_millis((base_ms as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let cancel = Cancellation::new();
        let calls = AtomicU32::new(0);
        let result: Result<u32, StorageError> = with_retry(&cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminal_error_not_retried() {
        let cancel = Cancellation::new();
        let calls = AtomicU32::new(0);
        let result: Result<u32, StorageError> = with_retry(&cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::NotFound("x".to_string())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_error_retried_until_budget_exhausted() {
        let cancel = Cancellation::new();
        let calls = AtomicU32::new(0);
        let result: Result<u32, StorageError> = with_retry(&cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::Backend(opendal::Error::new(
                opendal::ErrorKind::Unexpected,
                "boom",
            ))) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), (MAX_RETRIES + 1) as u32);
    }

    #[tokio::test]
    async fn cancellation_stops_retry_loop() {
        let cancel = Cancellation::new();
        cancel.cancel();
        let calls = AtomicU32::new(0);
        let result: Result<u32, StorageError> = with_retry(&cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::Backend(opendal::Error::new(
                opendal::ErrorKind::Unexpected,
                "boom",
            ))) }
        })
        .await;
        assert!(matches!(result, Err(StorageError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
