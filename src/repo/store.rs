use crate::domain::order::{Order, OrderPatch};
use crate::domain::payment::{Payment, RefundRecord};
use crate::domain::webhook::{DisputeRecord, OutboxMessage, WebhookEventRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub payment: Payment,
    pub order_patch: Option<OrderPatch>,
    pub refund: Option<RefundRecord>,
    pub event: Option<WebhookEventRecord>,
    pub outbox: Vec<OutboxMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    VersionConflict,
    DuplicateEvent,
}

#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: &Payment) -> Result<()>;

    async fn find(&self, payment_id: Uuid) -> Result<Option<Payment>>;

    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Payment>>;

    async fn find_by_idempotency(&self, order_id: &str, key: &str) -> Result<Option<Payment>>;

    async fn commit(&self, commit: TransitionCommit) -> Result<CommitOutcome>;

    async fn list_created_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Payment>>;
}

#[async_trait::async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>>;
}

#[async_trait::async_trait]
pub trait WebhookLedger: Send + Sync {
    async fn seen(&self, event_id: &str) -> Result<bool>;

    /// Insert-if-absent. `false` means the event was already recorded.
    async fn record(&self, event: &WebhookEventRecord) -> Result<bool>;

    async fn record_dispute(&self, event: &WebhookEventRecord, dispute: &DisputeRecord)
        -> Result<bool>;

    async fn purge_received_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
