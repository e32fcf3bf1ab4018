use crate::domain::order::Order;
use crate::domain::payment::Payment;
use crate::domain::webhook::{DisputeRecord, OutboxMessage, WebhookEventRecord};
use crate::repo::store::{CommitOutcome, OrderStore, PaymentStore, TransitionCommit, WebhookLedger};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    payments: HashMap<Uuid, Payment>,
    intents: HashMap<String, Uuid>,
    orders: HashMap<String, Order>,
    events: HashMap<String, WebhookEventRecord>,
    disputes: Vec<DisputeRecord>,
    outbox: Vec<OutboxMessage>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_order(&self, order: Order) -> Result<()> {
        self.lock()?.orders.insert(order.order_id.clone(), order);
        Ok(())
    }

    pub fn outbox(&self) -> Result<Vec<OutboxMessage>> {
        Ok(self.lock()?.outbox.clone())
    }

    pub fn disputes(&self) -> Result<Vec<DisputeRecord>> {
        Ok(self.lock()?.disputes.clone())
    }

    pub fn ledger_entry(&self, event_id: &str) -> Result<Option<WebhookEventRecord>> {
        Ok(self.lock()?.events.get(event_id).cloned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait::async_trait]
impl PaymentStore for MemoryStore {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        let mut state = self.lock()?;
        if state.intents.contains_key(&payment.intent_id) {
            anyhow::bail!("duplicate intent id {}", payment.intent_id);
        }
        if state.payments.contains_key(&payment.payment_id) {
            anyhow::bail!("duplicate payment id {}", payment.payment_id);
        }
        state
            .intents
            .insert(payment.intent_id.clone(), payment.payment_id);
        state.payments.insert(payment.payment_id, payment.clone());
        Ok(())
    }

    async fn find(&self, payment_id: Uuid) -> Result<Option<Payment>> {
        Ok(self.lock()?.payments.get(&payment_id).cloned())
    }

    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Payment>> {
        let state = self.lock()?;
        Ok(state
            .intents
            .get(intent_id)
            .and_then(|id| state.payments.get(id))
            .cloned())
    }

    async fn find_by_idempotency(&self, order_id: &str, key: &str) -> Result<Option<Payment>> {
        Ok(self
            .lock()?
            .payments
            .values()
            .find(|p| p.order_id == order_id && p.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn commit(&self, commit: TransitionCommit) -> Result<CommitOutcome> {
        let mut state = self.lock()?;

        if let Some(event) = &commit.event {
            if state.events.contains_key(&event.event_id) {
                return Ok(CommitOutcome::DuplicateEvent);
            }
        }

        let stored_version = state
            .payments
            .get(&commit.payment.payment_id)
            .map(|p| p.version)
            .ok_or_else(|| anyhow!("payment {} not found", commit.payment.payment_id))?;
        if stored_version != commit.payment.version {
            return Ok(CommitOutcome::VersionConflict);
        }

        if let Some(patch) = &commit.order_patch {
            let order = state
                .orders
                .get_mut(&commit.payment.order_id)
                .ok_or_else(|| anyhow!("order {} not found", commit.payment.order_id))?;
            order.apply(patch);
        }

        let mut payment = commit.payment;
        payment.version += 1;
        state.payments.insert(payment.payment_id, payment);

        if let Some(event) = commit.event {
            state.events.insert(event.event_id.clone(), event);
        }
        for message in commit.outbox {
            let exists = state
                .outbox
                .iter()
                .any(|m| m.payment_id == message.payment_id && m.event_key == message.event_key);
            if !exists {
                state.outbox.push(message);
            }
        }

        Ok(CommitOutcome::Committed)
    }

    async fn list_created_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Payment>> {
        let mut out: Vec<Payment> = self
            .lock()?
            .payments
            .values()
            .filter(|p| start.map_or(true, |s| p.created_at >= s))
            .filter(|p| end.map_or(true, |e| p.created_at <= e))
            .cloned()
            .collect();
        out.sort_by_key(|p| p.created_at);
        Ok(out)
    }
}

#[async_trait::async_trait]
impl OrderStore for MemoryStore {
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.lock()?.orders.get(order_id).cloned())
    }
}

#[async_trait::async_trait]
impl WebhookLedger for MemoryStore {
    async fn seen(&self, event_id: &str) -> Result<bool> {
        Ok(self.lock()?.events.contains_key(event_id))
    }

    async fn record(&self, event: &WebhookEventRecord) -> Result<bool> {
        let mut state = self.lock()?;
        if state.events.contains_key(&event.event_id) {
            return Ok(false);
        }
        state.events.insert(event.event_id.clone(), event.clone());
        Ok(true)
    }

    async fn record_dispute(
        &self,
        event: &WebhookEventRecord,
        dispute: &DisputeRecord,
    ) -> Result<bool> {
        let mut state = self.lock()?;
        if state.events.contains_key(&event.event_id) {
            return Ok(false);
        }
        state.events.insert(event.event_id.clone(), event.clone());
        if !state.disputes.iter().any(|d| d.dispute_id == dispute.dispute_id) {
            state.disputes.push(dispute.clone());
        }
        Ok(true)
    }

    async fn purge_received_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock()?;
        let before = state.events.len();
        state.events.retain(|_, e| e.received_at >= cutoff);
        Ok((before - state.events.len()) as u64)
    }
}
