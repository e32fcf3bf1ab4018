use crate::domain::webhook::{DisputeRecord, WebhookEventRecord};
use crate::repo::store::WebhookLedger;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

#[derive(Clone)]
pub struct WebhookEventsRepo {
    pub pool: PgPool,
}

impl WebhookEventsRepo {
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Postgres>,
        event: &WebhookEventRecord,
    ) -> Result<bool> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, event_type, intent_id, outcome, received_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.event_type)
        .bind(&event.intent_id)
        .bind(event.outcome.as_str())
        .bind(event.received_at)
        .execute(&mut **tx)
        .await?
        .rows_affected();
        Ok(inserted == 1)
    }
}

#[async_trait::async_trait]
impl WebhookLedger for WebhookEventsRepo {
    async fn seen(&self, event_id: &str) -> Result<bool> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT event_id FROM webhook_events WHERE event_id = $1")
                .bind(event_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn record(&self, event: &WebhookEventRecord) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let inserted = Self::insert_tx(&mut tx, event).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn record_dispute(
        &self,
        event: &WebhookEventRecord,
        dispute: &DisputeRecord,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        if !Self::insert_tx(&mut tx, event).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO payment_disputes (
                dispute_id, event_id, intent_id, charge_id, amount_minor, currency, reason, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (dispute_id) DO NOTHING
            "#,
        )
        .bind(&dispute.dispute_id)
        .bind(&dispute.event_id)
        .bind(&dispute.intent_id)
        .bind(&dispute.charge_id)
        .bind(dispute.amount.as_ref().map(|m| m.minor()))
        .bind(dispute.amount.as_ref().map(|m| m.currency().code().to_string()))
        .bind(&dispute.reason)
        .bind(&dispute.status)
        .bind(dispute.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn purge_received_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let deleted = sqlx::query("DELETE FROM webhook_events WHERE received_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted)
    }
}
