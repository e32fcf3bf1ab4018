use crate::domain::error::PaymentError;
use crate::domain::payment::{ErrorEnvelope, ErrorPayload};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub fn envelope(code: &str, message: impl Into<String>, details: Option<String>) -> Json<ErrorEnvelope> {
    Json(ErrorEnvelope {
        error: ErrorPayload {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    })
}

pub fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, envelope("VALIDATION_ERROR", message, None)).into_response()
}

pub fn error_response(err: PaymentError) -> Response {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(code = err.code(), "request failed: {:?}", err);
    } else {
        tracing::debug!(code = err.code(), "request rejected: {}", err);
    }
    (
        status,
        envelope(err.code(), err.public_message(), err.public_details()),
    )
        .into_response()
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        error_response(self)
    }
}
