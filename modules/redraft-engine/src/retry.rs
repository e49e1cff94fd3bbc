//! Retry/backoff wrapper around one flaky asynchronous call.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::warn;

/// How a single attempt failed. Determines the backoff flavor, not the
/// schedule: every class shares the same exponential schedule and the same
/// attempt budget.
#[derive(Debug, Error)]
pub enum CallError {
    /// The service answered 429. Backoff gets a random jitter so
    /// concurrently rate-limited calls don't retry in lockstep.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Connection-level failure (timeout, refused, reset).
    #[error("transient network failure: {0}")]
    Transient(String),

    /// The response arrived but had the wrong shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Terminal per-call outcome after the attempt budget is spent. Callers that
/// tolerate partial failure map this to a soft sentinel; callers that cannot
/// proceed without the result propagate it.
#[derive(Debug, Error)]
#[error("retry budget exhausted after {attempts} attempts: {last}")]
pub struct RetryExhausted {
    pub attempts: u32,
    #[source]
    pub last: CallError,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Run `op` until it succeeds or the attempt budget is spent.
///
/// Backoff before attempt N+1 is `base_delay * 2^(N-1)`; rate-limited
/// attempts add 0-1s of jitter on top.
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                attempt += 1;
                if attempt >= policy.max_attempts.max(1) {
                    return Err(RetryExhausted {
                        attempts: attempt,
                        last: error,
                    });
                }

                let backoff = policy.base_delay * 2u32.pow(attempt - 1);
                let delay = match &error {
                    CallError::RateLimited(_) => {
                        backoff + Duration::from_millis(rand::rng().random_range(0..1000))
                    }
                    _ => backoff,
                };
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "call failed, retrying after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
