use crate::http::errors::envelope;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

pub const ADMIN_KEY_HEADER: &str = "X-Internal-Api-Key";

pub async fn require_internal_api_key(
    State(expected): State<String>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(ADMIN_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if expected.is_empty() || !keys_match(provided, &expected) {
        tracing::warn!(path = %request.uri().path(), "admin request without valid api key");
        return (
            StatusCode::UNAUTHORIZED,
            envelope("UNAUTHORIZED", "missing or invalid admin key", None),
        )
            .into_response();
    }

    next.run(request).await
}

fn keys_match(provided: &str, expected: &str) -> bool {
    Sha256::digest(provided.as_bytes()) == Sha256::digest(expected.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_exact_keys_match() {
        assert!(keys_match("k-123", "k-123"));
        assert!(!keys_match("k-12", "k-123"));
        assert!(!keys_match("", "k-123"));
    }
}
