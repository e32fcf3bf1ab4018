use crate::domain::webhook::OutboxMessage;
use crate::repo::outbox_repo::OutboxRepo;
use anyhow::Result;
use chrono::{Duration, Utc};

const BATCH_SIZE: i64 = 100;
const STALE_CLAIM_SECS: i64 = 300;
const STREAM_MAXLEN: u64 = 1_000_000;

#[derive(Clone)]
pub struct OutboxRelay {
    pub outbox_repo: OutboxRepo,
    pub redis_client: redis::Client,
    pub stream_key: String,
}

impl OutboxRelay {
    pub async fn run(self) {
        let mut ticks: u64 = 0;
        loop {
            if ticks % 300 == 0 {
                match self
                    .outbox_repo
                    .requeue_stale(Utc::now() - Duration::seconds(STALE_CLAIM_SECS))
                    .await
                {
                    Ok(0) => {}
                    Ok(n) => tracing::warn!(requeued = n, "requeued stale outbox claims"),
                    Err(err) => tracing::error!("outbox requeue failed: {}", err),
                }
            }
            if let Err(err) = self.tick().await {
                tracing::error!("outbox relay error: {}", err);
            }
            ticks = ticks.wrapping_add(1);
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
    }

    async fn tick(&self) -> Result<()> {
        let batch = self.outbox_repo.claim_due(BATCH_SIZE).await?;
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        for item in batch {
            match self.publish(&mut conn, &item.message).await {
                Ok(()) => {
                    self.outbox_repo.mark_published(item.id).await?;
                    tracing::debug!(
                        payment_id = %item.message.payment_id,
                        event_key = %item.message.event_key,
                        "lifecycle event published"
                    );
                }
                Err(e) => {
                    let attempts = item.attempts + 1;
                    let next_attempt_at = Utc::now() + Duration::seconds(retry_after_secs(attempts));
                    self.outbox_repo
                        .schedule_retry(item.id, attempts, next_attempt_at, &e.to_string())
                        .await?;
                    tracing::warn!("xadd failed for outbox id {}: {}", item.id, e);
                }
            }
        }

        Ok(())
    }

    async fn publish(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        message: &OutboxMessage,
    ) -> Result<()> {
        let payload = serde_json::to_string(&message.payload)?;
        let _: String = redis::cmd("XADD")
            .arg(&self.stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(STREAM_MAXLEN)
            .arg("*")
            .arg("type")
            .arg(&message.event_type)
            .arg("key")
            .arg(&message.event_key)
            .arg("paymentId")
            .arg(message.payment_id.to_string())
            .arg("event")
            .arg(payload)
            .query_async(conn)
            .await?;
        Ok(())
    }
}

/// Seconds until the next publish attempt: doubling from 2, capped at 5 minutes.
pub fn retry_after_secs(attempts: i32) -> i64 {
    let exp = attempts.clamp(1, 9) as u32;
    i64::min(300, 2_i64.pow(exp))
}
