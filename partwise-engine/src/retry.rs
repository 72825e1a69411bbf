//! Bounded retry of transient store failures

use std::future::Future;

use partwise_core::*;
use tracing::{debug, info, warn};

/// Run `call` until it succeeds, fails permanently, or the policy's attempts
/// run out. Only `StoreError::is_transient()` failures are repeated.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> StoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Store call succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let backoff = policy.backoff(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %error,
                    "Store call failed, will retry"
                );
                debug!(operation, backoff_ms = backoff.as_millis() as u64, "Waiting before retry");
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}
