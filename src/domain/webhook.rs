use crate::domain::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    Noop,
    Rejected,
    UnknownIntent,
    DisputeRecorded,
    Ignored,
}

impl WebhookOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::Noop => "noop",
            WebhookOutcome::Rejected => "rejected",
            WebhookOutcome::UnknownIntent => "unknown_intent",
            WebhookOutcome::DisputeRecorded => "dispute_recorded",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    pub event_id: String,
    pub event_type: String,
    pub intent_id: Option<String>,
    pub outcome: WebhookOutcome,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeRecord {
    pub dispute_id: String,
    pub event_id: String,
    pub intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub amount: Option<Money>,
    pub reason: Option<String>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub payment_id: uuid::Uuid,
    pub event_type: String,
    pub event_key: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(rename = "type")]
    pub event_type: String,
    pub outcome: String,
}
