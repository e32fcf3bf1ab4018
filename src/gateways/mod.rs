use crate::domain::money::Money;
use crate::domain::payment::{PaymentMethodDetails, RefundReason};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod mock;
pub mod signature;
pub mod stripe;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("gateway rejected request ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }
}

#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub amount: Money,
    pub metadata: BTreeMap<String, String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedIntent {
    pub intent_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentSnapshot {
    pub intent_id: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub method_details: Option<PaymentMethodDetails>,
    pub receipt_url: Option<String>,
    pub fee_minor: Option<i64>,
    pub net_minor: Option<i64>,
    pub risk_score: Option<i32>,
    pub risk_level: Option<String>,
    pub failure_reason: Option<String>,
    pub next_action: Option<serde_json::Value>,
}

impl IntentSnapshot {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }

    pub fn requires_action(&self) -> bool {
        self.status == "requires_action"
    }
}

#[derive(Debug, Clone)]
pub struct GatewayRefundRequest {
    pub intent_id: String,
    pub amount: Option<Money>,
    pub reason: RefundReason,
    pub metadata: BTreeMap<String, String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundSnapshot {
    pub refund_id: String,
    pub amount: Money,
    pub status: String,
    pub reason: Option<String>,
}

impl RefundSnapshot {
    pub fn is_settled_or_pending(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "pending")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisputeSnapshot {
    pub dispute_id: String,
    pub intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub amount: Option<Money>,
    pub reason: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEventKind {
    IntentSucceeded(IntentSnapshot),
    IntentFailed(IntentSnapshot),
    IntentCanceled(IntentSnapshot),
    DisputeCreated(DisputeSnapshot),
    /// Known type, but `data.object` did not parse.
    Malformed(String),
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayEvent {
    pub id: String,
    pub event_type: String,
    pub created: DateTime<Utc>,
    pub kind: GatewayEventKind,
}

impl GatewayEvent {
    pub fn intent_id(&self) -> Option<&str> {
        match &self.kind {
            GatewayEventKind::IntentSucceeded(s)
            | GatewayEventKind::IntentFailed(s)
            | GatewayEventKind::IntentCanceled(s) => Some(s.intent_id.as_str()),
            GatewayEventKind::DisputeCreated(d) => d.intent_id.as_deref(),
            GatewayEventKind::Malformed(_) | GatewayEventKind::Unknown => None,
        }
    }
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Side-effecting on the gateway. Callers must supply a stable idempotency key.
    async fn create_intent(&self, request: &IntentRequest) -> Result<CreatedIntent, GatewayError>;

    async fn confirm_intent(
        &self,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<IntentSnapshot, GatewayError>;

    /// `amount: None` refunds the remaining balance.
    async fn create_refund(
        &self,
        request: &GatewayRefundRequest,
    ) -> Result<RefundSnapshot, GatewayError>;

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
        secret: &str,
    ) -> Result<GatewayEvent, GatewayError>;
}
