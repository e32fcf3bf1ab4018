use crate::domain::webhook::OutboxMessage;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

#[derive(Debug, Clone)]
pub struct ClaimedMessage {
    pub id: i64,
    pub message: OutboxMessage,
    pub attempts: i32,
}

#[derive(Clone)]
pub struct OutboxRepo {
    pub pool: PgPool,
}

impl OutboxRepo {
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Postgres>,
        message: &OutboxMessage,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_events_outbox (payment_id, event_type, event_key, payload_json)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (payment_id, event_key) DO NOTHING
            "#,
        )
        .bind(message.payment_id)
        .bind(&message.event_type)
        .bind(&message.event_key)
        .bind(&message.payload)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn claim_due(&self, batch_size: i64) -> Result<Vec<ClaimedMessage>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query(
            r#"
            SELECT id, payment_id, event_type, event_key, payload_json, attempts
            FROM payment_events_outbox
            WHERE status = 'PENDING' AND next_attempt_at <= now()
            ORDER BY id ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(batch_size)
        .fetch_all(&mut *tx)
        .await?;

        if rows.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = rows.iter().map(|r| r.get("id")).collect();
        sqlx::query(
            "UPDATE payment_events_outbox SET status = 'PROCESSING', claimed_at = now() WHERE id = ANY($1)",
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(rows
            .into_iter()
            .map(|r| ClaimedMessage {
                id: r.get("id"),
                attempts: r.get("attempts"),
                message: OutboxMessage {
                    payment_id: r.get("payment_id"),
                    event_type: r.get("event_type"),
                    event_key: r.get("event_key"),
                    payload: r.get("payload_json"),
                },
            })
            .collect())
    }

    pub async fn mark_published(&self, id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE payment_events_outbox SET status = 'PUBLISHED', published_at = now(), last_error = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn schedule_retry(
        &self,
        id: i64,
        attempts: i32,
        next_attempt_at: DateTime<Utc>,
        error: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE payment_events_outbox
            SET status = 'PENDING', attempts = $2, next_attempt_at = $3, last_error = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(next_attempt_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn requeue_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64> {
        let res = sqlx::query(
            r#"
            UPDATE payment_events_outbox
            SET status = 'PENDING', next_attempt_at = now()
            WHERE status = 'PROCESSING' AND claimed_at < $1
            "#,
        )
        .bind(claimed_before)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected())
    }
}
