use chrono::{Duration, Utc};
use storefront_payments::domain::error::PaymentError;
use storefront_payments::domain::money::{Currency, Money};
use storefront_payments::domain::payment::{Payment, PaymentStatus};
use storefront_payments::gateways::{IntentSnapshot, RefundSnapshot};
use storefront_payments::lifecycle::transitions::{apply, check_refund, Transition, TransitionContext, Trigger};
use uuid::Uuid;

fn inr(minor: i64) -> Money {
    Money::new(minor, Currency::parse("INR").unwrap())
}

fn payment(status: PaymentStatus, refunded: i64) -> Payment {
    let created = Utc::now() - Duration::hours(1);
    Payment {
        payment_id: Uuid::new_v4(),
        intent_id: "pi_sm".to_string(),
        order_id: "ord_sm".to_string(),
        customer_id: None,
        amount: inr(1999),
        refunded: inr(refunded),
        status,
        payment_method: "card".to_string(),
        method_details: None,
        fee: None,
        net: None,
        risk_score: None,
        fraud_detected: false,
        failure_reason: None,
        receipt_url: None,
        client_secret: "pi_sm_secret".to_string(),
        idempotency_key: None,
        metadata: serde_json::json!({}),
        refunds: Vec::new(),
        created_at: created,
        processed_at: matches!(
            status,
            PaymentStatus::Succeeded | PaymentStatus::PartiallyRefunded | PaymentStatus::Refunded
        )
        .then_some(created),
        updated_at: created,
        version: 3,
    }
}

fn ctx() -> TransitionContext {
    TransitionContext {
        now: Utc::now(),
        fraud_risk_threshold: 75,
    }
}

fn snapshot(status: &str) -> IntentSnapshot {
    IntentSnapshot {
        intent_id: "pi_sm".to_string(),
        status: status.to_string(),
        payment_method: Some("card".to_string()),
        fee_minor: Some(59),
        net_minor: Some(1940),
        risk_score: Some(30),
        ..IntentSnapshot::default()
    }
}

fn refund(id: &str, minor: i64) -> RefundSnapshot {
    RefundSnapshot {
        refund_id: id.to_string(),
        amount: inr(minor),
        status: "succeeded".to_string(),
        reason: None,
    }
}

fn advanced(t: Transition) -> Payment {
    match t {
        Transition::Advanced { payment, .. } => payment,
        Transition::Unchanged => panic!("expected a transition"),
    }
}

#[test]
fn confirm_success_sets_processed_at_and_fees() {
    let current = payment(PaymentStatus::Pending, 0);
    let c = ctx();
    let next = advanced(apply(&current, Trigger::Confirmed(&snapshot("succeeded")), &c).unwrap());
    assert_eq!(next.status, PaymentStatus::Succeeded);
    assert_eq!(next.processed_at, Some(c.now));
    assert_eq!(next.fee, Some(inr(59)));
    assert_eq!(next.net, Some(inr(1940)));
    assert_eq!(next.version, current.version);
}

#[test]
fn confirm_without_success_moves_to_processing() {
    let current = payment(PaymentStatus::Pending, 0);
    let next = advanced(apply(&current, Trigger::Confirmed(&snapshot("requires_action")), &ctx()).unwrap());
    assert_eq!(next.status, PaymentStatus::Processing);
    assert!(next.processed_at.is_none());
    assert!(next.fee.is_none());
}

#[test]
fn repeated_processing_confirm_with_nothing_new_is_unchanged() {
    let current = payment(PaymentStatus::Processing, 0);
    let t = apply(&current, Trigger::Confirmed(&snapshot("processing")), &ctx()).unwrap();
    assert_eq!(t, Transition::Unchanged);
}

#[test]
fn success_is_idempotent() {
    let current = payment(PaymentStatus::Succeeded, 0);
    let s = snapshot("succeeded");
    assert_eq!(apply(&current, Trigger::IntentSucceeded(&s), &ctx()).unwrap(), Transition::Unchanged);
    assert_eq!(apply(&current, Trigger::Confirmed(&s), &ctx()).unwrap(), Transition::Unchanged);
}

#[test]
fn processing_can_still_fail_or_cancel() {
    let current = payment(PaymentStatus::Processing, 0);
    let failed = advanced(apply(&current, Trigger::IntentFailed(&snapshot("requires_payment_method")), &ctx()).unwrap());
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert_eq!(failed.failure_reason.as_deref(), Some("Payment failed"));
    let canceled = advanced(apply(&current, Trigger::IntentCanceled(&snapshot("canceled")), &ctx()).unwrap());
    assert_eq!(canceled.status, PaymentStatus::Canceled);
}

#[test]
fn terminal_states_reject_intent_events() {
    let s = snapshot("succeeded");
    for status in [PaymentStatus::Failed, PaymentStatus::Canceled, PaymentStatus::Refunded] {
        let current = payment(status, if status == PaymentStatus::Refunded { 1999 } else { 0 });
        for trigger in [
            Trigger::Confirmed(&s),
            Trigger::IntentSucceeded(&s),
            Trigger::IntentFailed(&s),
            Trigger::IntentCanceled(&s),
        ] {
            let err = apply(&current, trigger, &ctx()).unwrap_err();
            assert!(
                matches!(err, PaymentError::InvalidTransition { from, .. } if from == status),
                "{status} accepted {}",
                trigger.name()
            );
        }
    }
}

#[test]
fn succeeded_cannot_fail_afterwards() {
    let current = payment(PaymentStatus::Succeeded, 0);
    let err = apply(&current, Trigger::IntentFailed(&snapshot("failed")), &ctx()).unwrap_err();
    assert!(matches!(err, PaymentError::InvalidTransition { .. }));
}

#[test]
fn refunds_accumulate_until_fully_refunded() {
    let current = payment(PaymentStatus::Succeeded, 0);
    let partial = match apply(&current, Trigger::Refunded(&refund("re_1", 500)), &ctx()).unwrap() {
        Transition::Advanced { payment, refund, from } => {
            assert_eq!(from, PaymentStatus::Succeeded);
            assert_eq!(refund.map(|r| r.amount), Some(inr(500)));
            payment
        }
        Transition::Unchanged => panic!("expected refund"),
    };
    assert_eq!(partial.status, PaymentStatus::PartiallyRefunded);
    assert_eq!(partial.refunded, inr(500));
    assert_eq!(partial.processed_at, current.processed_at);

    let full = advanced(apply(&partial, Trigger::Refunded(&refund("re_2", 1499)), &ctx()).unwrap());
    assert_eq!(full.status, PaymentStatus::Refunded);
    assert_eq!(full.refunds.len(), 2);
}

#[test]
fn single_full_refund_goes_straight_to_refunded() {
    let current = payment(PaymentStatus::Succeeded, 0);
    let next = advanced(apply(&current, Trigger::Refunded(&refund("re_1", 1999)), &ctx()).unwrap());
    assert_eq!(next.status, PaymentStatus::Refunded);
}

#[test]
fn replayed_refund_id_changes_nothing() {
    let current = payment(PaymentStatus::Succeeded, 0);
    let once = advanced(apply(&current, Trigger::Refunded(&refund("re_1", 500)), &ctx()).unwrap());
    let again = apply(&once, Trigger::Refunded(&refund("re_1", 500)), &ctx()).unwrap();
    assert_eq!(again, Transition::Unchanged);
}

#[test]
fn refund_guard() {
    let paid = payment(PaymentStatus::PartiallyRefunded, 500);
    assert_eq!(check_refund(&paid, None).unwrap(), inr(1499));
    assert_eq!(check_refund(&paid, Some(&inr(1499))).unwrap(), inr(1499));
    assert!(matches!(
        check_refund(&paid, Some(&inr(1500))),
        Err(PaymentError::RefundExceedsBalance { requested: 1500, remaining: 1499 })
    ));
    assert!(matches!(check_refund(&paid, Some(&inr(0))), Err(PaymentError::Validation(_))));
    assert!(matches!(check_refund(&paid, Some(&inr(-5))), Err(PaymentError::Validation(_))));

    let usd = Money::new(100, Currency::parse("USD").unwrap());
    assert!(matches!(check_refund(&paid, Some(&usd)), Err(PaymentError::Money(_))));

    for status in [
        PaymentStatus::Pending,
        PaymentStatus::Processing,
        PaymentStatus::Failed,
        PaymentStatus::Canceled,
        PaymentStatus::Refunded,
    ] {
        assert!(matches!(
            check_refund(&payment(status, 0), Some(&inr(1))),
            Err(PaymentError::PaymentNotRefundable(s)) if s == status
        ));
    }
}

#[test]
fn fraud_flag_follows_risk_threshold_or_level() {
    let current = payment(PaymentStatus::Pending, 0);
    let mut s = snapshot("succeeded");
    s.risk_score = Some(75);
    assert!(advanced(apply(&current, Trigger::Confirmed(&s), &ctx()).unwrap()).fraud_detected);

    s.risk_score = Some(74);
    assert!(!advanced(apply(&current, Trigger::Confirmed(&s), &ctx()).unwrap()).fraud_detected);

    s.risk_level = Some("highest".to_string());
    assert!(advanced(apply(&current, Trigger::Confirmed(&s), &ctx()).unwrap()).fraud_detected);
}
