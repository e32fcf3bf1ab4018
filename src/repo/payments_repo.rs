use crate::domain::money::{Currency, Money};
use crate::domain::payment::{Payment, PaymentMethodDetails, RefundRecord};
use crate::repo::orders_repo::OrdersRepo;
use crate::repo::outbox_repo::OutboxRepo;
use crate::repo::store::{CommitOutcome, PaymentStore, TransitionCommit};
use crate::repo::webhook_events_repo::WebhookEventsRepo;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

const PAYMENT_COLUMNS: &str = r#"
    payment_id, intent_id, order_id, customer_id, amount_minor, refunded_minor, currency,
    status, payment_method, method_details, fee_minor, net_minor, risk_score, fraud_detected,
    failure_reason, receipt_url, client_secret, idempotency_key, metadata,
    created_at, processed_at, updated_at, version
"#;

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
}

impl PaymentsRepo {
    async fn load_refunds(&self, payment_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<RefundRecord>>> {
        if payment_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT refund_id, payment_id, amount_minor, currency, reason, status, created_at
            FROM payment_refunds
            WHERE payment_id = ANY($1)
            ORDER BY created_at ASC, refund_id ASC
            "#,
        )
        .bind(payment_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut out: HashMap<Uuid, Vec<RefundRecord>> = HashMap::new();
        for r in rows {
            let currency: String = r.get("currency");
            let record = RefundRecord {
                refund_id: r.get("refund_id"),
                payment_id: r.get("payment_id"),
                amount: Money::new(r.get("amount_minor"), Currency::parse(&currency)?),
                reason: r.get("reason"),
                status: r.get("status"),
                created_at: r.get("created_at"),
            };
            out.entry(record.payment_id).or_default().push(record);
        }
        Ok(out)
    }

    async fn hydrate(&self, rows: Vec<PgRow>) -> Result<Vec<Payment>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.get("payment_id")).collect();
        let mut refunds = self.load_refunds(&ids).await?;
        rows.iter()
            .map(|r| {
                let id: Uuid = r.get("payment_id");
                payment_from_row(r, refunds.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn insert_refund_tx(
        tx: &mut Transaction<'_, Postgres>,
        refund: &RefundRecord,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_refunds (refund_id, payment_id, amount_minor, currency, reason, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (refund_id) DO NOTHING
            "#,
        )
        .bind(&refund.refund_id)
        .bind(refund.payment_id)
        .bind(refund.amount.minor())
        .bind(refund.amount.currency().code())
        .bind(&refund.reason)
        .bind(&refund.status)
        .bind(refund.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

fn payment_from_row(r: &PgRow, refunds: Vec<RefundRecord>) -> Result<Payment> {
    let currency = Currency::parse(r.get::<String, _>("currency").as_str())?;
    let status: String = r.get("status");
    let method_details: Option<serde_json::Value> = r.get("method_details");
    let fee: Option<i64> = r.get("fee_minor");
    let net: Option<i64> = r.get("net_minor");

    Ok(Payment {
        payment_id: r.get("payment_id"),
        intent_id: r.get("intent_id"),
        order_id: r.get("order_id"),
        customer_id: r.get("customer_id"),
        amount: Money::new(r.get("amount_minor"), currency.clone()),
        refunded: Money::new(r.get("refunded_minor"), currency.clone()),
        status: status.parse()?,
        payment_method: r.get("payment_method"),
        method_details: method_details
            .map(serde_json::from_value::<PaymentMethodDetails>)
            .transpose()
            .context("decoding method_details")?,
        fee: fee.map(|m| Money::new(m, currency.clone())),
        net: net.map(|m| Money::new(m, currency)),
        risk_score: r.get("risk_score"),
        fraud_detected: r.get("fraud_detected"),
        failure_reason: r.get("failure_reason"),
        receipt_url: r.get("receipt_url"),
        client_secret: r.get("client_secret"),
        idempotency_key: r.get("idempotency_key"),
        metadata: r.get("metadata"),
        refunds,
        created_at: r.get("created_at"),
        processed_at: r.get("processed_at"),
        updated_at: r.get("updated_at"),
        version: r.get("version"),
    })
}

#[async_trait::async_trait]
impl PaymentStore for PaymentsRepo {
    async fn insert(&self, p: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (
                payment_id, intent_id, order_id, customer_id, amount_minor, refunded_minor, currency,
                status, payment_method, client_secret, idempotency_key, metadata,
                created_at, updated_at, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7,
                $8, $9, $10, $11, $12,
                $13, $14, $15
            )
            "#,
        )
        .bind(p.payment_id)
        .bind(&p.intent_id)
        .bind(&p.order_id)
        .bind(&p.customer_id)
        .bind(p.amount.minor())
        .bind(p.refunded.minor())
        .bind(p.amount.currency().code())
        .bind(p.status.as_str())
        .bind(&p.payment_method)
        .bind(&p.client_secret)
        .bind(&p.idempotency_key)
        .bind(&p.metadata)
        .bind(p.created_at)
        .bind(p.updated_at)
        .bind(p.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find(&self, payment_id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = $1"))
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_intent(&self, intent_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE intent_id = $1"))
            .bind(intent_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_by_idempotency(&self, order_id: &str, key: &str) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 AND idempotency_key = $2"
        ))
        .bind(order_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn commit(&self, commit: TransitionCommit) -> Result<CommitOutcome> {
        let p = &commit.payment;
        let mut tx = self.pool.begin().await?;

        if let Some(event) = &commit.event {
            if !WebhookEventsRepo::insert_tx(&mut tx, event).await? {
                tx.rollback().await?;
                return Ok(CommitOutcome::DuplicateEvent);
            }
        }

        let method_details = p
            .method_details
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let updated = sqlx::query(
            r#"
            UPDATE payments SET
                status = $3,
                refunded_minor = $4,
                payment_method = $5,
                method_details = $6,
                fee_minor = $7,
                net_minor = $8,
                risk_score = $9,
                fraud_detected = $10,
                failure_reason = $11,
                receipt_url = $12,
                metadata = $13,
                processed_at = $14,
                updated_at = $15,
                version = version + 1
            WHERE payment_id = $1 AND version = $2
            "#,
        )
        .bind(p.payment_id)
        .bind(p.version)
        .bind(p.status.as_str())
        .bind(p.refunded.minor())
        .bind(&p.payment_method)
        .bind(method_details)
        .bind(p.fee.as_ref().map(Money::minor))
        .bind(p.net.as_ref().map(Money::minor))
        .bind(p.risk_score)
        .bind(p.fraud_detected)
        .bind(&p.failure_reason)
        .bind(&p.receipt_url)
        .bind(&p.metadata)
        .bind(p.processed_at)
        .bind(p.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::VersionConflict);
        }

        if let Some(refund) = &commit.refund {
            Self::insert_refund_tx(&mut tx, refund).await?;
        }
        if let Some(patch) = &commit.order_patch {
            OrdersRepo::update_order_tx(&mut tx, &p.order_id, patch).await?;
        }
        for message in &commit.outbox {
            OutboxRepo::insert_tx(&mut tx, message).await?;
        }

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    async fn list_created_between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Payment>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS} FROM payments
            WHERE ($1::timestamptz IS NULL OR created_at >= $1)
              AND ($2::timestamptz IS NULL OR created_at <= $2)
            ORDER BY created_at ASC
            "#
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate(rows).await
    }
}
