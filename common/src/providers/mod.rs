pub mod embedding;
pub mod llm;
pub mod tts;
pub mod vision;

use std::future::Future;
use std::time::Duration;

use tokio_retry::RetryIf;

use crate::error::AppError;

/// Hard ceiling on any single provider call. Timeouts classify as
/// network failures, which are retryable.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(120);

const BACKOFF_BASE_MS: f64 = 100.0;
const BACKOFF_FACTOR: f64 = 1.5;
const MAX_ATTEMPTS: u32 = 3;

/// Delays between attempts: 100ms, 150ms (three attempts total).
fn backoff_schedule() -> impl Iterator<Item = Duration> {
    (0..MAX_ATTEMPTS.saturating_sub(1)).map(|attempt| {
        let millis = BACKOFF_BASE_MS * BACKOFF_FACTOR.powi(attempt as i32);
        Duration::from_millis(millis as u64)
    })
}

/// Runs a provider call under the shared timeout, classifying an elapsed
/// timer as a retryable network failure.
pub async fn with_timeout<T, Fut>(fut: Fut) -> Result<T, AppError>
where
    Fut: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(PROVIDER_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::provider(
            crate::error::ProviderErrorKind::Network,
            format!("provider call exceeded {}s timeout", PROVIDER_TIMEOUT.as_secs()),
        )),
    }
}

/// Retries transient provider failures on the exponential schedule. The
/// operation owns its timeout; non-retryable errors propagate immediately.
pub async fn with_retry<T, F, Fut>(mut operation: F) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    RetryIf::spawn(backoff_schedule(), || operation(), AppError::is_retryable).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_schedule_matches_contract() {
        let delays: Vec<Duration> = backoff_schedule().collect();
        assert_eq!(
            delays,
            vec![Duration::from_millis(100), Duration::from_millis(150)]
        );
    }

    #[tokio::test]
    async fn retry_gives_up_after_three_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), AppError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::provider(ProviderErrorKind::Network, "down")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_retry_auth_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<(), AppError> = with_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::provider(ProviderErrorKind::Auth, "bad key")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(|| {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(AppError::provider(ProviderErrorKind::RateLimit, "slow down"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.expect("should recover"), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
