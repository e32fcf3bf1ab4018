use crate::domain::money::{Currency, Money};
use crate::domain::payment::PaymentMethodDetails;
use crate::gateways::{
    signature, CreatedIntent, DisputeSnapshot, GatewayError, GatewayEvent, GatewayEventKind,
    GatewayRefundRequest, IntentRequest, IntentSnapshot, PaymentGateway, RefundSnapshot,
};
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;

pub struct StripeGateway {
    pub base_url: String,
    pub secret_key: String,
    pub return_url: String,
    pub timeout_ms: u64,
    pub webhook_tolerance_secs: i64,
    pub client: reqwest::Client,
}

impl StripeGateway {
    async fn post_form(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<Value, GatewayError> {
        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(form)
            .timeout(std::time::Duration::from_millis(self.timeout_ms));
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                return Err(GatewayError::Unavailable("gateway timeout".to_string()))
            }
            Err(e) => return Err(GatewayError::Unavailable(e.to_string())),
        };

        let status = resp.status();
        if status.is_success() {
            return resp
                .json::<Value>()
                .await
                .map_err(|e| GatewayError::Unavailable(format!("unreadable response: {e}")));
        }

        let body = resp.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}

fn classify_failure(status: StatusCode, body: &str) -> GatewayError {
    let transient = status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS;
    if transient {
        return GatewayError::Unavailable(format!("HTTP_{}", status.as_u16()));
    }

    let parsed: Option<StripeErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = match parsed {
        Some(b) => (
            b.error
                .decline_code
                .or(b.error.code)
                .or(b.error.error_type)
                .unwrap_or_else(|| format!("HTTP_{}", status.as_u16())),
            b.error.message.unwrap_or_default(),
        ),
        None => (
            format!("HTTP_{}", status.as_u16()),
            body.chars().take(200).collect(),
        ),
    };
    GatewayError::Rejected { code, message }
}

#[async_trait::async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<CreatedIntent, GatewayError> {
        let mut form = vec![
            ("amount".to_string(), request.amount.minor().to_string()),
            (
                "currency".to_string(),
                request.amount.currency().code().to_lowercase(),
            ),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        for (k, v) in &request.metadata {
            form.push((format!("metadata[{k}]"), v.clone()));
        }

        let v = self
            .post_form("/v1/payment_intents", &form, Some(&request.idempotency_key))
            .await?;
        let intent: StripeIntent = serde_json::from_value(v)
            .map_err(|e| GatewayError::Unavailable(format!("unexpected intent payload: {e}")))?;

        Ok(CreatedIntent {
            intent_id: intent.id,
            client_secret: intent.client_secret.unwrap_or_default(),
        })
    }

    async fn confirm_intent(
        &self,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<IntentSnapshot, GatewayError> {
        let form = vec![
            ("payment_method".to_string(), payment_method.to_string()),
            (
                "return_url".to_string(),
                format!("{}?payment_intent={}", self.return_url, intent_id),
            ),
            (
                "expand[]".to_string(),
                "latest_charge.balance_transaction".to_string(),
            ),
            ("expand[]".to_string(), "payment_method".to_string()),
        ];
        let v = self
            .post_form(&format!("/v1/payment_intents/{intent_id}/confirm"), &form, None)
            .await?;
        parse_intent(v)
    }

    async fn create_refund(
        &self,
        request: &GatewayRefundRequest,
    ) -> Result<RefundSnapshot, GatewayError> {
        let mut form = vec![
            ("payment_intent".to_string(), request.intent_id.clone()),
            ("reason".to_string(), request.reason.as_str().to_string()),
        ];
        if let Some(amount) = &request.amount {
            form.push(("amount".to_string(), amount.minor().to_string()));
        }
        for (k, v) in &request.metadata {
            form.push((format!("metadata[{k}]"), v.clone()));
        }

        let v = self
            .post_form("/v1/refunds", &form, Some(&request.idempotency_key))
            .await?;
        parse_refund(v)
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
        secret: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        signature::verify(
            payload,
            signature_header,
            secret,
            self.webhook_tolerance_secs,
            Utc::now(),
        )?;
        parse_event(payload)
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
    decline_code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    status: Option<String>,
    client_secret: Option<String>,
    payment_method: Option<Value>,
    last_payment_error: Option<StripeLastError>,
    next_action: Option<Value>,
    latest_charge: Option<Value>,
    charges: Option<StripeList<StripeCharge>>,
}

#[derive(Debug, Deserialize)]
struct StripeLastError {
    message: Option<String>,
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeCharge {
    receipt_url: Option<String>,
    balance_transaction: Option<Value>,
    outcome: Option<StripeOutcome>,
    payment_method_details: Option<StripeMethodDetails>,
}

#[derive(Debug, Deserialize)]
struct StripeOutcome {
    risk_score: Option<i32>,
    risk_level: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeMethodDetails {
    #[serde(rename = "type")]
    method_type: Option<String>,
    card: Option<StripeCard>,
}

#[derive(Debug, Deserialize)]
struct StripeCard {
    brand: Option<String>,
    last4: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeRefund {
    id: String,
    amount: i64,
    currency: String,
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeDispute {
    id: String,
    amount: Option<i64>,
    currency: Option<String>,
    charge: Option<Value>,
    payment_intent: Option<Value>,
    reason: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}

/// Expandable fields arrive either as a bare id or as the full object.
fn expandable_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Object(o) => o.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

pub fn parse_intent(v: Value) -> Result<IntentSnapshot, GatewayError> {
    let intent: StripeIntent = serde_json::from_value(v)
        .map_err(|e| GatewayError::Unavailable(format!("unexpected intent payload: {e}")))?;

    let charge: Option<StripeCharge> = match intent.latest_charge {
        Some(Value::Object(o)) => serde_json::from_value(Value::Object(o)).ok(),
        _ => intent.charges.and_then(|c| c.data.into_iter().next()),
    };

    let mut snapshot = IntentSnapshot {
        intent_id: intent.id,
        status: intent.status.unwrap_or_else(|| "unknown".to_string()),
        next_action: intent.next_action.filter(|v| !v.is_null()),
        failure_reason: intent
            .last_payment_error
            .and_then(|e| e.message.or(e.code)),
        ..IntentSnapshot::default()
    };

    if let Some(pm) = &intent.payment_method {
        snapshot.payment_method = match pm {
            Value::Object(o) => o.get("type").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        if let Some(card) = pm.get("card") {
            snapshot.method_details = Some(PaymentMethodDetails {
                method_type: snapshot.payment_method.clone(),
                brand: card.get("brand").and_then(Value::as_str).map(str::to_string),
                last4: card.get("last4").and_then(Value::as_str).map(str::to_string),
            });
        }
    }

    if let Some(charge) = charge {
        snapshot.receipt_url = charge.receipt_url;
        if let Some(Value::Object(bt)) = charge.balance_transaction {
            snapshot.fee_minor = bt.get("fee").and_then(Value::as_i64);
            snapshot.net_minor = bt.get("net").and_then(Value::as_i64);
        }
        if let Some(outcome) = charge.outcome {
            snapshot.risk_score = outcome.risk_score;
            snapshot.risk_level = outcome.risk_level;
        }
        if let Some(details) = charge.payment_method_details {
            let card = details.card;
            if snapshot.payment_method.is_none() {
                snapshot.payment_method = details.method_type.clone();
            }
            if snapshot.method_details.is_none() {
                snapshot.method_details = Some(PaymentMethodDetails {
                    method_type: details.method_type,
                    brand: card.as_ref().and_then(|c| c.brand.clone()),
                    last4: card.and_then(|c| c.last4),
                });
            }
        }
    }

    Ok(snapshot)
}

pub fn parse_refund(v: Value) -> Result<RefundSnapshot, GatewayError> {
    let refund: StripeRefund = serde_json::from_value(v)
        .map_err(|e| GatewayError::Unavailable(format!("unexpected refund payload: {e}")))?;
    let currency = Currency::parse(&refund.currency)
        .map_err(|e| GatewayError::Unavailable(e.to_string()))?;
    Ok(RefundSnapshot {
        refund_id: refund.id,
        amount: Money::new(refund.amount, currency),
        status: refund.status.unwrap_or_else(|| "pending".to_string()),
        reason: refund.reason,
    })
}

fn intent_event(object: Value, kind: fn(IntentSnapshot) -> GatewayEventKind) -> GatewayEventKind {
    match parse_intent(object) {
        Ok(snapshot) => kind(snapshot),
        Err(e) => GatewayEventKind::Malformed(e.to_string()),
    }
}

pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent, GatewayError> {
    let event: StripeEvent = serde_json::from_slice(payload)
        .map_err(|e| GatewayError::InvalidSignature(format!("malformed event body: {e}")))?;

    let kind = match event.event_type.as_str() {
        "payment_intent.succeeded" => intent_event(event.data.object, GatewayEventKind::IntentSucceeded),
        "payment_intent.payment_failed" => intent_event(event.data.object, GatewayEventKind::IntentFailed),
        "payment_intent.canceled" => intent_event(event.data.object, GatewayEventKind::IntentCanceled),
        "charge.dispute.created" => match serde_json::from_value::<StripeDispute>(event.data.object) {
            Ok(d) => {
                let amount = match (d.amount, d.currency.as_deref().map(Currency::parse)) {
                    (Some(minor), Some(Ok(c))) => Some(Money::new(minor, c)),
                    _ => None,
                };
                GatewayEventKind::DisputeCreated(DisputeSnapshot {
                    dispute_id: d.id,
                    intent_id: d.payment_intent.as_ref().and_then(expandable_id),
                    charge_id: d.charge.as_ref().and_then(expandable_id),
                    amount,
                    reason: d.reason,
                    status: d.status,
                })
            }
            Err(e) => GatewayEventKind::Malformed(format!("unexpected dispute payload: {e}")),
        },
        _ => GatewayEventKind::Unknown,
    };

    Ok(GatewayEvent {
        id: event.id,
        event_type: event.event_type,
        created: Utc
            .timestamp_opt(event.created, 0)
            .single()
            .unwrap_or_else(Utc::now),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_charge_details_from_expanded_intent() {
        let snapshot = parse_intent(json!({
            "id": "pi_1",
            "status": "succeeded",
            "payment_method": {"id": "pm_1", "type": "card", "card": {"brand": "visa", "last4": "4242"}},
            "latest_charge": {
                "id": "ch_1",
                "receipt_url": "https://pay.example/r/1",
                "balance_transaction": {"id": "txn_1", "fee": 59, "net": 1940},
                "outcome": {"risk_score": 12, "risk_level": "normal"}
            }
        }))
        .unwrap();

        assert!(snapshot.succeeded());
        assert_eq!(snapshot.fee_minor, Some(59));
        assert_eq!(snapshot.net_minor, Some(1940));
        assert_eq!(snapshot.risk_score, Some(12));
        assert_eq!(snapshot.payment_method.as_deref(), Some("card"));
        assert_eq!(
            snapshot.method_details.unwrap().last4.as_deref(),
            Some("4242")
        );
    }

    #[test]
    fn reads_legacy_charges_list_and_failure_message() {
        let snapshot = parse_intent(json!({
            "id": "pi_2",
            "status": "requires_payment_method",
            "last_payment_error": {"message": "Your card was declined."},
            "charges": {"data": [{"receipt_url": null, "payment_method_details": {"type": "card", "card": {"brand": "mastercard", "last4": "4444"}}}]}
        }))
        .unwrap();

        assert_eq!(snapshot.failure_reason.as_deref(), Some("Your card was declined."));
        assert_eq!(snapshot.payment_method.as_deref(), Some("card"));
    }

    #[test]
    fn unknown_event_types_parse_as_unknown() {
        let body = json!({"id": "evt_9", "type": "customer.created", "created": 1_700_000_000, "data": {"object": {}}});
        let event = parse_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(event.kind, GatewayEventKind::Unknown);
        assert_eq!(event.intent_id(), None);
    }

    #[test]
    fn intent_event_without_id_is_malformed() {
        let body = json!({"id": "evt_m", "type": "payment_intent.succeeded", "created": 1_700_000_000, "data": {"object": {"status": "succeeded"}}});
        let event = parse_event(body.to_string().as_bytes()).unwrap();
        assert!(matches!(event.kind, GatewayEventKind::Malformed(_)));
        assert_eq!(event.id, "evt_m");
    }

    #[test]
    fn dispute_event_links_intent() {
        let body = json!({"id": "evt_d", "type": "charge.dispute.created", "created": 1_700_000_000,
            "data": {"object": {"id": "dp_1", "amount": 1999, "currency": "inr", "charge": "ch_1", "payment_intent": "pi_1", "reason": "fraudulent", "status": "needs_response"}}});
        let event = parse_event(body.to_string().as_bytes()).unwrap();
        assert_eq!(event.intent_id(), Some("pi_1"));
    }

    #[test]
    fn classifies_http_failures() {
        assert!(classify_failure(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(classify_failure(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        let rejected = classify_failure(
            StatusCode::PAYMENT_REQUIRED,
            r#"{"error":{"type":"card_error","code":"card_declined","decline_code":"insufficient_funds","message":"declined"}}"#,
        );
        assert_eq!(
            rejected,
            GatewayError::Rejected {
                code: "insufficient_funds".to_string(),
                message: "declined".to_string()
            }
        );
    }
}
