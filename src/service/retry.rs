use crate::gateways::GatewayError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDirective {
    Retry(Duration),
    GiveUp,
}

pub fn attempt_limit(policy: &RetryPolicy) -> u32 {
    policy.max_attempts.max(1)
}

/// Exponential backoff for the attempt that just failed (1-based), capped at
/// `max_delay_ms`, plus up to 25% jitter.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let base = policy
        .base_delay_ms
        .saturating_mul(1_u64 << exp)
        .min(policy.max_delay_ms);
    let jitter = if base >= 4 {
        rand::thread_rng().gen_range(0..=base / 4)
    } else {
        0
    };
    Duration::from_millis(base + jitter)
}

pub fn classify_failure(policy: &RetryPolicy, err: &GatewayError, attempt: u32) -> RetryDirective {
    if !err.is_transient() || attempt >= attempt_limit(policy) {
        return RetryDirective::GiveUp;
    }
    RetryDirective::Retry(backoff_delay(policy, attempt))
}

pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(err) => match classify_failure(policy, &err, attempt) {
                RetryDirective::GiveUp => {
                    if err.is_transient() {
                        tracing::error!(operation, attempt, "gateway call exhausted retries: {}", err);
                    } else {
                        tracing::warn!(operation, "gateway rejected request: {}", err);
                    }
                    return Err(err);
                }
                RetryDirective::Retry(delay) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient gateway failure, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            },
        }
    }
}
