use journeylink_core::{StoreError, StoreResult};
use std::future::Future;
use tracing::warn;

/// Runs an idempotent read, retrying exactly once on a backend failure.
///
/// Guard failures are answers, not faults, and are returned as-is. Writes
/// must never go through here.
pub async fn read_with_retry<T, F, Fut>(operation: &'static str, mut read: F) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    match read().await {
        Err(StoreError::Backend(reason)) => {
            warn!(operation, %reason, "Read failed, retrying once");
            read().await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_retries_backend_failure_once() {
        let calls = AtomicUsize::new(0);
        let result = read_with_retry("flaky", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Backend("connection reset".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_second_failure() {
        let calls = AtomicUsize::new(0);
        let result: StoreResult<()> = read_with_retry("down", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Backend("down".to_string()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_guard_failures_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: StoreResult<()> = read_with_retry("missing", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::RideNotFound(Uuid::nil()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::RideNotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
