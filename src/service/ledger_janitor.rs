use crate::config::MIN_WEBHOOK_RETENTION_DAYS;
use crate::repo::store::WebhookLedger;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

pub fn retention_cutoff(now: DateTime<Utc>, retention_days: i64) -> DateTime<Utc> {
    now - Duration::days(retention_days.max(MIN_WEBHOOK_RETENTION_DAYS))
}

pub async fn purge_once(
    ledger: &dyn WebhookLedger,
    retention_days: i64,
    now: DateTime<Utc>,
) -> Result<u64> {
    let cutoff = retention_cutoff(now, retention_days);
    let purged = ledger.purge_received_before(cutoff).await?;
    if purged > 0 {
        tracing::info!(purged, cutoff = %cutoff, "purged expired webhook ledger entries");
    } else {
        tracing::debug!(cutoff = %cutoff, "no webhook ledger entries to purge");
    }
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_retention_is_raised_to_minimum() {
        let now = Utc::now();
        assert_eq!(retention_cutoff(now, 7), now - Duration::days(30));
        assert_eq!(retention_cutoff(now, 90), now - Duration::days(90));
    }
}
