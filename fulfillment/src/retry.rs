use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Runs `operation` up to `max_attempts` times.
///
/// After a failed attempt `n` (counted from 1) that `is_retryable` accepts,
/// waits `backoff(n, &error)` and tries again. Non-retryable errors and the
/// error of the last attempt are returned as-is.
pub async fn retry_with_backoff<T, E, Op, Fut, P, B>(
    max_attempts: u32,
    is_retryable: P,
    backoff: B,
    mut operation: Op,
) -> Result<T, E>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    B: Fn(u32, &E) -> Duration,
{
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                sleep(backoff(attempt, &err)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Exponential delay for rate limits, flat delay for everything else.
pub fn rate_limit_aware_backoff(
    base_delay: Duration,
    is_rate_limit: impl Fn(&crate::errors::GatewayError) -> bool,
) -> impl Fn(u32, &crate::errors::GatewayError) -> Duration {
    move |attempt, err| {
        if is_rate_limit(err) {
            base_delay.saturating_mul(2_u32.saturating_pow(attempt))
        } else {
            base_delay
        }
    }
}
