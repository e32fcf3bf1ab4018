use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use storefront_payments::config::AppConfig;
use storefront_payments::repo::webhook_events_repo::WebhookEventsRepo;
use storefront_payments::service::ledger_janitor::purge_once;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&cfg.database_url)
        .await?;

    let repo = WebhookEventsRepo { pool };
    let once = std::env::args().any(|a| a == "--once");

    loop {
        if let Err(err) = purge_once(&repo, cfg.webhook_retention_days, chrono::Utc::now()).await {
            tracing::error!("webhook ledger purge failed: {}", err);
            if once {
                return Err(err);
            }
        }
        if once {
            return Ok(());
        }
        tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
    }
}
