use crate::domain::error::PaymentError;
use crate::domain::money::Money;
use crate::domain::payment::{Payment, PaymentStatus, RefundRecord};
use crate::gateways::{IntentSnapshot, RefundSnapshot};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy)]
pub enum Trigger<'a> {
    Confirmed(&'a IntentSnapshot),
    IntentSucceeded(&'a IntentSnapshot),
    IntentFailed(&'a IntentSnapshot),
    IntentCanceled(&'a IntentSnapshot),
    Refunded(&'a RefundSnapshot),
}

impl Trigger<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Trigger::Confirmed(_) => "confirm",
            Trigger::IntentSucceeded(_) => "payment_intent.succeeded",
            Trigger::IntentFailed(_) => "payment_intent.payment_failed",
            Trigger::IntentCanceled(_) => "payment_intent.canceled",
            Trigger::Refunded(_) => "refund",
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransitionContext {
    pub now: DateTime<Utc>,
    pub fraud_risk_threshold: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// `payment` is the next state; its `version` is still the one it was read at.
    Advanced {
        from: PaymentStatus,
        payment: Payment,
        refund: Option<RefundRecord>,
    },
    Unchanged,
}

/// Decides the next state of `current` under `trigger`. Never mutates `current`;
/// any `Err` means nothing may be written.
pub fn apply(
    current: &Payment,
    trigger: Trigger<'_>,
    ctx: &TransitionContext,
) -> Result<Transition, PaymentError> {
    use PaymentStatus::*;

    let reject = || PaymentError::InvalidTransition {
        from: current.status,
        trigger: trigger.name(),
    };

    match (current.status, trigger) {
        (Pending | Processing, Trigger::Confirmed(s) | Trigger::IntentSucceeded(s))
            if s.succeeded() || matches!(trigger, Trigger::IntentSucceeded(_)) =>
        {
            Ok(advance(current, mark_succeeded(current, s, ctx)))
        }
        (Pending | Processing, Trigger::Confirmed(s)) => {
            let mut next = current.clone();
            next.status = Processing;
            record_method(&mut next, s);
            if next == *current {
                return Ok(Transition::Unchanged);
            }
            next.updated_at = ctx.now;
            Ok(advance(current, next))
        }
        (Succeeded, Trigger::Confirmed(s)) if s.succeeded() => Ok(Transition::Unchanged),
        (Succeeded, Trigger::IntentSucceeded(_)) => Ok(Transition::Unchanged),
        (Pending | Processing, Trigger::IntentFailed(s)) => {
            let mut next = current.clone();
            next.status = Failed;
            next.failure_reason = Some(
                s.failure_reason
                    .clone()
                    .unwrap_or_else(|| "Payment failed".to_string()),
            );
            next.updated_at = ctx.now;
            Ok(advance(current, next))
        }
        (Pending | Processing, Trigger::IntentCanceled(_)) => {
            let mut next = current.clone();
            next.status = Canceled;
            next.updated_at = ctx.now;
            Ok(advance(current, next))
        }
        (_, Trigger::Refunded(refund)) => apply_refund(current, refund, ctx),
        _ => Err(reject()),
    }
}

/// Guard run before asking the gateway for a refund. `None` means the whole
/// remaining balance.
pub fn check_refund(current: &Payment, requested: Option<&Money>) -> Result<Money, PaymentError> {
    if !current.status.is_refundable() {
        return Err(PaymentError::PaymentNotRefundable(current.status));
    }
    let remaining = current.remaining();
    let amount = match requested {
        Some(amount) => amount.clone(),
        None => remaining.clone(),
    };
    if !amount.is_positive() {
        return Err(PaymentError::Validation(
            "refund amount must be greater than zero".to_string(),
        ));
    }
    if amount.try_cmp(&remaining)? == Ordering::Greater {
        return Err(PaymentError::RefundExceedsBalance {
            requested: amount.minor(),
            remaining: remaining.minor(),
        });
    }
    Ok(amount)
}

fn apply_refund(
    current: &Payment,
    refund: &RefundSnapshot,
    ctx: &TransitionContext,
) -> Result<Transition, PaymentError> {
    if current.refunds.iter().any(|r| r.refund_id == refund.refund_id) {
        return Ok(Transition::Unchanged);
    }
    let amount = check_refund(current, Some(&refund.amount))?;

    let mut next = current.clone();
    next.refunded = current.refunded.checked_add(&amount)?;
    next.status = if next.refunded.minor() == next.amount.minor() {
        PaymentStatus::Refunded
    } else {
        PaymentStatus::PartiallyRefunded
    };
    let record = RefundRecord {
        refund_id: refund.refund_id.clone(),
        payment_id: current.payment_id,
        amount,
        reason: refund.reason.clone(),
        status: refund.status.clone(),
        created_at: ctx.now,
    };
    next.refunds.push(record.clone());
    next.updated_at = ctx.now;

    Ok(Transition::Advanced {
        from: current.status,
        payment: next,
        refund: Some(record),
    })
}

fn mark_succeeded(current: &Payment, s: &IntentSnapshot, ctx: &TransitionContext) -> Payment {
    let currency = current.amount.currency().clone();
    let mut next = current.clone();
    next.status = PaymentStatus::Succeeded;
    next.processed_at = Some(current.processed_at.unwrap_or(ctx.now));
    record_method(&mut next, s);
    if s.receipt_url.is_some() {
        next.receipt_url = s.receipt_url.clone();
    }
    if let Some(fee) = s.fee_minor {
        next.fee = Some(Money::new(fee, currency.clone()));
    }
    if let Some(net) = s.net_minor {
        next.net = Some(Money::new(net, currency));
    }
    if s.risk_score.is_some() {
        next.risk_score = s.risk_score;
    }
    next.fraud_detected = next
        .risk_score
        .is_some_and(|score| score >= ctx.fraud_risk_threshold)
        || s.risk_level.as_deref() == Some("highest");
    next.updated_at = ctx.now;
    next
}

fn record_method(next: &mut Payment, s: &IntentSnapshot) {
    if let Some(method) = &s.payment_method {
        next.payment_method = method.clone();
    }
    if s.method_details.is_some() {
        next.method_details = s.method_details.clone();
    }
}

fn advance(current: &Payment, next: Payment) -> Transition {
    Transition::Advanced {
        from: current.status,
        payment: next,
        refund: None,
    }
}
