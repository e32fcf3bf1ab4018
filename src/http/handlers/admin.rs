use crate::analytics::aggregator::PaymentAnalytics;
use crate::domain::payment::RefundRequest;
use crate::http::errors::{bad_request, error_response};
use crate::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub async fn refund(
    State(state): State<AppState>,
    payload: Result<Json<RefundRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(req) = match payload {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match state.payment_service.refund(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub currency: String,
    pub total_payments: u64,
    pub total_amount: Decimal,
    pub total_refunded: Decimal,
    pub status_breakdown: BTreeMap<String, u64>,
    pub payment_methods: BTreeMap<String, u64>,
    pub average_transaction_value: Decimal,
    pub success_rate: f64,
    pub fraud_detected: u64,
}

impl From<PaymentAnalytics> for AnalyticsResponse {
    fn from(a: PaymentAnalytics) -> Self {
        Self {
            currency: a.currency.code().to_string(),
            total_payments: a.total_payments,
            total_amount: a.total_amount.to_decimal(),
            total_refunded: a.total_refunded.to_decimal(),
            status_breakdown: a
                .status_breakdown
                .into_iter()
                .map(|(status, n)| (status.as_str().to_string(), n))
                .collect(),
            payment_methods: a.payment_methods,
            average_transaction_value: a.average_transaction_value.to_decimal(),
            success_rate: a.success_rate,
            fraud_detected: a.fraud_detected,
        }
    }
}

pub async fn analytics(
    State(state): State<AppState>,
    Query(q): Query<AnalyticsQuery>,
) -> impl IntoResponse {
    let start = match q.start_date.as_deref().map(|s| parse_bound(s, false)).transpose() {
        Ok(v) => v,
        Err(msg) => return bad_request(msg),
    };
    let end = match q.end_date.as_deref().map(|s| parse_bound(s, true)).transpose() {
        Ok(v) => v,
        Err(msg) => return bad_request(msg),
    };

    match state.payment_service.analytics(start, end, q.currency).await {
        Ok(a) => (StatusCode::OK, Json(AnalyticsResponse::from(a))).into_response(),
        Err(err) => error_response(err),
    }
}

/// Accepts RFC 3339 timestamps or plain dates. A plain end date covers the
/// whole day.
pub fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| format!("invalid date: {raw}"))?;
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| format!("invalid date: {raw}"))?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_end_date_is_inclusive() {
        let end = parse_bound("2024-03-01", true).unwrap();
        assert_eq!(end.to_rfc3339(), "2024-03-01T23:59:59.999+00:00");
        let start = parse_bound("2024-03-01", false).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_bound("yesterday", false).is_err());
    }
}
