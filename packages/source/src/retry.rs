//! Bounded retry for provider calls.
//!
//! Providers send each request once; callers that tolerate transient
//! failures wrap the call in [`with_retry`].
//!
//! # Usage
//!
//! ```ignore
//! let rows = retry::with_retry(2, Duration::from_secs(1), "soil query", || {
//!     provider.query(&wkt)
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

/// Runs `operation` up to `attempts` times, sleeping `backoff` between
/// attempts, and returns the first success or the last error.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn with_retry<T, E, F, Fut>(
    attempts: u32,
    backoff: Duration,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                log::warn!("{label} attempt {attempt}/{attempts} failed: {e}");
                log::warn!("  retry {}/{} in {backoff:?}...", attempt, attempts - 1);
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                log::error!("{label} failed after {attempts} attempt(s): {e}");
                return Err(e);
            }
        }
    }
}
