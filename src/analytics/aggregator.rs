use crate::domain::money::{Currency, Money, MoneyError};
use crate::domain::payment::{Payment, PaymentStatus};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentAnalytics {
    pub currency: Currency,
    pub total_payments: u64,
    pub total_amount: Money,
    pub total_refunded: Money,
    pub status_breakdown: BTreeMap<PaymentStatus, u64>,
    pub payment_methods: BTreeMap<String, u64>,
    pub average_transaction_value: Money,
    pub success_rate: f64,
    pub fraud_detected: u64,
}

/// Rolls up `payments` reported in `currency`. Payments in any other currency
/// are left out rather than converted.
pub fn aggregate(payments: &[Payment], currency: &Currency) -> Result<PaymentAnalytics, MoneyError> {
    let mut total_amount = Money::zero(currency.clone());
    let mut total_refunded = Money::zero(currency.clone());
    let mut status_breakdown: BTreeMap<PaymentStatus, u64> =
        PaymentStatus::ALL.iter().map(|s| (*s, 0)).collect();
    let mut payment_methods: BTreeMap<String, u64> = BTreeMap::new();
    let mut total_payments = 0_u64;
    let mut ever_succeeded = 0_u64;
    let mut fraud_detected = 0_u64;

    for payment in payments.iter().filter(|p| p.amount.currency() == currency) {
        total_payments += 1;
        total_amount = total_amount.checked_add(&payment.amount)?;
        total_refunded = total_refunded.checked_add(&payment.refunded)?;
        *status_breakdown.entry(payment.status).or_insert(0) += 1;
        *payment_methods
            .entry(payment.payment_method.clone())
            .or_insert(0) += 1;
        if payment.processed_at.is_some() {
            ever_succeeded += 1;
        }
        if payment.fraud_detected {
            fraud_detected += 1;
        }
    }

    let success_rate = if total_payments > 0 {
        ever_succeeded as f64 / total_payments as f64 * 100.0
    } else {
        0.0
    };

    Ok(PaymentAnalytics {
        currency: currency.clone(),
        total_payments,
        average_transaction_value: total_amount.div_round(total_payments),
        total_amount,
        total_refunded,
        status_breakdown,
        payment_methods,
        success_rate,
        fraud_detected,
    })
}
