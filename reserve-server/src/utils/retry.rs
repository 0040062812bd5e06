//! Bounded backoff for transient store failures
//!
//! Only errors flagged [`AppError::is_transient`] are retried; everything
//! else is returned to the caller on the first attempt.

use std::time::Duration;

use super::AppResult;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 50;
const RETRY_MAX_DELAY_MS: u64 = 1_000;

/// Delay before retry number `attempt` (1-based), exponential and capped
fn backoff(attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis((RETRY_BASE_DELAY_MS * factor).min(RETRY_MAX_DELAY_MS))
}

/// Run a store operation, retrying transient failures with backoff.
pub async fn with_store_retry<T, F>(op: &'static str, mut f: F) -> AppResult<T>
where
    F: FnMut() -> AppResult<T>,
{
    let mut attempt = 1;
    loop {
        match f() {
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = backoff(attempt);
                tracing::warn!(
                    op,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient store error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                tracing::error!(op, attempts = attempt, error = %e, "Store operation failed");
                return Err(e);
            }
            result => return result,
        }
    }
}
