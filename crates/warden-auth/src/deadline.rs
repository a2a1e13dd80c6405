//! Deadlines for persistence calls.
//!
//! Core components never wait on storage indefinitely. A call that does not
//! finish in time surfaces as `temporarily_unavailable`; the dropped future
//! cancels the in-flight query.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::AuthError;
use crate::AuthResult;

/// Runs a storage operation under a deadline.
///
/// `operation` names the call in logs and in the resulting error.
///
/// # Errors
///
/// Returns `AuthError::TemporarilyUnavailable` if the deadline elapses, or
/// the operation's own error.
pub async fn with_deadline<F, T>(
    limit: Duration,
    operation: &'static str,
    future: F,
) -> AuthResult<T>
where
    F: Future<Output = AuthResult<T>>,
{
    match timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = limit.as_millis() as u64,
                "Storage operation timed out"
            );
            Err(AuthError::temporarily_unavailable(operation))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let result = with_deadline(Duration::from_secs(1), "fast", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_passes_operation_error_through() {
        let result: AuthResult<()> = with_deadline(Duration::from_secs(1), "failing", async {
            Err(AuthError::storage("boom"))
        })
        .await;
        assert!(matches!(result, Err(AuthError::Storage { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_deadline_is_temporarily_unavailable() {
        let result: AuthResult<()> = with_deadline(Duration::from_millis(50), "slow", async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.oauth_error_code(), "temporarily_unavailable");
    }
}
