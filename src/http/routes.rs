use crate::http::handlers::{admin, ops, payments, webhooks};
use crate::http::middleware::admin_auth::require_internal_api_key;
use crate::AppState;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

pub fn build_router(state: AppState, admin_key: String) -> Router {
    let admin_routes = Router::new()
        .route("/admin/payments/refunds", post(admin::refund))
        .route("/admin/payments/analytics", get(admin::analytics))
        .layer(from_fn_with_state(admin_key, require_internal_api_key));

    Router::new()
        .route("/health", get(payments::health))
        .route("/ops/liveness", get(ops::liveness))
        .route("/payments/intents", post(payments::create_intent))
        .route("/payments/confirm", post(payments::confirm))
        .route("/payments/webhook", post(webhooks::receive))
        .merge(admin_routes)
        .with_state(state)
}

pub fn ops_router(state: ops::OpsState) -> Router {
    Router::new()
        .route("/ops/readiness", get(ops::readiness))
        .with_state(state)
}
