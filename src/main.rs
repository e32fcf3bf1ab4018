use axum::middleware::from_fn_with_state;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use storefront_payments::config::AppConfig;
use storefront_payments::gateways::mock::MockGateway;
use storefront_payments::gateways::stripe::StripeGateway;
use storefront_payments::gateways::PaymentGateway;
use storefront_payments::http::handlers::ops::OpsState;
use storefront_payments::http::middleware::rate_limit::{enforce, RateLimitState};
use storefront_payments::http::routes::{build_router, ops_router};
use storefront_payments::repo::orders_repo::OrdersRepo;
use storefront_payments::repo::outbox_repo::OutboxRepo;
use storefront_payments::repo::payments_repo::PaymentsRepo;
use storefront_payments::repo::webhook_events_repo::WebhookEventsRepo;
use storefront_payments::service::outbox_relay::OutboxRelay;
use storefront_payments::service::payment_service::{PaymentService, PaymentSettings};
use storefront_payments::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let redis_client = redis::Client::open(cfg.redis_url.clone())?;

    let gateway: Arc<dyn PaymentGateway> = match cfg.gateway_adapter.as_str() {
        "mock" => {
            tracing::warn!("using mock payment gateway");
            let mut mock = MockGateway::new(
                &std::env::var("MOCK_GATEWAY_BEHAVIOR").unwrap_or_else(|_| "ALWAYS_SUCCESS".to_string()),
            );
            mock.webhook_tolerance_secs = cfg.webhook_tolerance_secs;
            Arc::new(mock)
        }
        _ => {
            if cfg.stripe_secret_key.is_empty() {
                anyhow::bail!("STRIPE_SECRET_KEY must be set when GATEWAY_ADAPTER=stripe");
            }
            Arc::new(StripeGateway {
                base_url: cfg.stripe_base_url.clone(),
                secret_key: cfg.stripe_secret_key.clone(),
                return_url: cfg.return_url.clone(),
                timeout_ms: cfg.gateway_timeout_ms,
                webhook_tolerance_secs: cfg.webhook_tolerance_secs,
                client: reqwest::Client::new(),
            })
        }
    };
    if cfg.stripe_webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET is empty; every webhook will be rejected");
    }

    let payments_repo = Arc::new(PaymentsRepo { pool: pool.clone() });
    let payment_service = PaymentService {
        payments: payments_repo,
        orders: Arc::new(OrdersRepo { pool: pool.clone() }),
        ledger: Arc::new(WebhookEventsRepo { pool: pool.clone() }),
        gateway,
        retry: cfg.retry.clone(),
        settings: PaymentSettings {
            publishable_key: cfg.stripe_publishable_key.clone(),
            webhook_secret: cfg.stripe_webhook_secret.clone(),
            fraud_risk_threshold: cfg.fraud_risk_threshold,
            default_currency: cfg.default_currency.clone(),
        },
    };

    let relay = OutboxRelay {
        outbox_repo: OutboxRepo { pool: pool.clone() },
        redis_client: redis_client.clone(),
        stream_key: cfg.stream_key.clone(),
    };
    tokio::spawn(relay.run());

    let state = AppState { payment_service };
    let app = build_router(state, cfg.internal_api_key.clone())
        .merge(ops_router(OpsState {
            pool: pool.clone(),
            redis_client: redis_client.clone(),
        }))
        .layer(from_fn_with_state(
            RateLimitState {
                redis_client,
                max_per_minute: cfg.rate_limit_per_minute,
            },
            enforce,
        ));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
