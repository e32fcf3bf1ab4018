use std::sync::atomic::{AtomicU32, Ordering};
use storefront_payments::gateways::GatewayError;
use storefront_payments::service::retry::{
    attempt_limit, classify_failure, with_backoff, RetryDirective, RetryPolicy,
};

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 0,
        max_delay_ms: 0,
    }
}

fn unavailable() -> GatewayError {
    GatewayError::Unavailable("connect timeout".to_string())
}

#[test]
fn rejections_are_never_retried() {
    let rejected = GatewayError::Rejected {
        code: "card_declined".to_string(),
        message: "declined".to_string(),
    };
    assert_eq!(classify_failure(&fast_policy(5), &rejected, 1), RetryDirective::GiveUp);
}

#[test]
fn transient_failures_retry_until_the_limit() {
    let p = fast_policy(3);
    assert!(matches!(classify_failure(&p, &unavailable(), 1), RetryDirective::Retry(_)));
    assert!(matches!(classify_failure(&p, &unavailable(), 2), RetryDirective::Retry(_)));
    assert_eq!(classify_failure(&p, &unavailable(), 3), RetryDirective::GiveUp);
}

#[test]
fn zero_attempts_still_means_one_call() {
    assert_eq!(attempt_limit(&fast_policy(0)), 1);
}

#[tokio::test]
async fn with_backoff_recovers_from_transient_failures() {
    let calls = AtomicU32::new(0);
    let out = with_backoff(&fast_policy(3), "test_call", || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(unavailable())
            } else {
                Ok(n)
            }
        }
    })
    .await;
    assert_eq!(out, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn with_backoff_stops_at_the_first_rejection() {
    let calls = AtomicU32::new(0);
    let out: Result<(), GatewayError> = with_backoff(&fast_policy(5), "test_call", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            Err(GatewayError::Rejected {
                code: "invalid_request_error".to_string(),
                message: "bad amount".to_string(),
            })
        }
    })
    .await;
    assert!(matches!(out, Err(GatewayError::Rejected { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn with_backoff_gives_up_after_the_budget() {
    let calls = AtomicU32::new(0);
    let out: Result<(), GatewayError> = with_backoff(&fast_policy(4), "test_call", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(unavailable()) }
    })
    .await;
    assert_eq!(out, Err(unavailable()));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}
