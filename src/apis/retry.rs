use crate::error::{EtlError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Transport failures, rate limiting and server errors are worth another attempt.
pub fn is_retryable(err: &EtlError) -> bool {
    match err {
        EtlError::Http(_) => true,
        EtlError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Runs `op` up to `max_attempts` times, sleeping `base_delay × attempt` between
/// retryable failures. The attempt number (starting at 1) is passed to `op`.
pub async fn with_linear_backoff<T, F, Fut>(
    operation: &str,
    max_attempts: u32,
    base_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && is_retryable(&e) => {
                let wait = base_delay * attempt;
                warn!("{} failed (attempt {}/{}): {}; retrying in {:?}", operation, attempt, attempts, e, wait);
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
