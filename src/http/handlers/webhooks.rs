use crate::http::errors::error_response;
use crate::http::handlers::payments::header_value;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;

pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature =
        header_value(&headers, "Stripe-Signature").or_else(|| header_value(&headers, "signature"));

    match state
        .payment_service
        .handle_webhook(&body, signature.as_deref())
        .await
    {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(err) => error_response(err),
    }
}
