mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use storefront_payments::http::routes::build_router;
use storefront_payments::AppState;
use support::*;
use tower::ServiceExt;

const ADMIN_KEY: &str = "test-admin-key";

fn app(h: &Harness) -> Router {
    build_router(
        AppState {
            payment_service: h.service.clone(),
        },
        ADMIN_KEY.to_string(),
    )
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-Customer-Id", CUSTOMER)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin(mut req: Request<Body>) -> Request<Body> {
    req.headers_mut()
        .insert("X-Internal-Api-Key", ADMIN_KEY.parse().unwrap());
    req
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn health_and_liveness() {
    let h = harness("ALWAYS_SUCCESS");
    let resp = app(&h)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let (status, body) = send(
        app(&h),
        Request::builder().uri("/ops/liveness").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["alive"], true);
}

#[tokio::test]
async fn create_and_confirm_over_http() {
    let h = harness("ALWAYS_SUCCESS");
    seed_order(&h.store, "ord_h1", Some(CUSTOMER));

    let (status, body) = send(
        app(&h),
        post_json("/payments/intents", json!({"orderId": "ord_h1", "amount": "19.99", "currency": "inr"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "created");
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["publishableKey"], "pk_test_123");
    assert!(body["clientSecret"].as_str().is_some());

    let payment_id: uuid::Uuid = serde_json::from_value(body["paymentId"].clone()).unwrap();
    let intent_id = load(&h, payment_id).await.intent_id;

    let (status, body) = send(
        app(&h),
        post_json(
            "/payments/confirm",
            json!({"paymentIntentId": intent_id, "paymentMethodId": "pm_card_visa"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["requiresAction"], false);
}

#[tokio::test]
async fn validation_errors_use_the_envelope() {
    let h = harness("ALWAYS_SUCCESS");

    let (status, body) = send(app(&h), post_json("/payments/intents", json!({"amount": "19.99"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let malformed = Request::builder()
        .method("POST")
        .uri("/payments/intents")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(app(&h), malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        app(&h),
        post_json("/payments/intents", json!({"orderId": "ord_nope", "amount": "10.00"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn other_customers_order_is_forbidden() {
    let h = harness("ALWAYS_SUCCESS");
    seed_order(&h.store, "ord_h2", Some("cust_someone_else"));
    let (status, body) = send(
        app(&h),
        post_json("/payments/intents", json!({"orderId": "ord_h2", "amount": "10.00"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn declined_card_returns_402_with_code_only() {
    let h = harness("ALWAYS_FAILURE");
    let p = pending_payment(&h, "ord_h3", 1999).await;
    let (status, body) = send(
        app(&h),
        post_json(
            "/payments/confirm",
            json!({"paymentIntentId": p.intent_id, "paymentMethodId": "pm_card_chargeDeclined"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error"]["code"], "GATEWAY_REJECTED");
    assert_eq!(body["error"]["details"], "card_declined");
    assert!(!body["error"]["message"].as_str().unwrap().contains("mock"));
}

#[tokio::test]
async fn webhook_endpoint_checks_signature() {
    let h = harness("ALWAYS_SUCCESS");
    let p = pending_payment(&h, "ord_h4", 1999).await;
    let raw = event_body("evt_h4", "payment_intent.succeeded", intent_object(&p.intent_id, "succeeded"));

    let unsigned = Request::builder()
        .method("POST")
        .uri("/payments/webhook")
        .body(Body::from(raw.clone()))
        .unwrap();
    let (status, body) = send(app(&h), unsigned).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_SIGNATURE");

    let signed = Request::builder()
        .method("POST")
        .uri("/payments/webhook")
        .header("Stripe-Signature", sign(&raw))
        .body(Body::from(raw.clone()))
        .unwrap();
    let (status, body) = send(app(&h), signed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(body["type"], "payment_intent.succeeded");
    assert_eq!(body["outcome"], "applied");

    let fallback_header = Request::builder()
        .method("POST")
        .uri("/payments/webhook")
        .header("signature", sign(&raw))
        .body(Body::from(raw))
        .unwrap();
    let (status, body) = send(app(&h), fallback_header).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "duplicate");
}

#[tokio::test]
async fn admin_routes_require_the_key() {
    let h = harness("ALWAYS_SUCCESS");
    let p = succeeded_payment(&h, "ord_h5", 1999).await;

    let (status, _) = send(
        app(&h),
        post_json("/admin/payments/refunds", json!({"paymentId": p.payment_id, "amount": "5.00"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        app(&h),
        admin(post_json(
            "/admin/payments/refunds",
            json!({"paymentId": p.payment_id, "amount": "5.00", "reason": "requested_by_customer"}),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["refundId"].as_str().unwrap().starts_with("re_"));
    assert_eq!(body["status"], "succeeded");

    let (status, body) = send(
        app(&h),
        admin(post_json(
            "/admin/payments/refunds",
            json!({"paymentId": p.payment_id, "amount": "15.00"}),
        )),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "REFUND_EXCEEDS_BALANCE");
}

#[tokio::test]
async fn analytics_over_http() {
    let h = harness("ALWAYS_SUCCESS");
    succeeded_payment(&h, "ord_h6", 1999).await;
    pending_payment(&h, "ord_h7", 1000).await;

    let req = admin(
        Request::builder()
            .uri("/admin/payments/analytics?currency=INR&startDate=2000-01-01")
            .body(Body::empty())
            .unwrap(),
    );
    let (status, body) = send(app(&h), req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalPayments"], 2);
    assert_eq!(body["successRate"], 50.0);
    assert_eq!(body["statusBreakdown"].as_object().unwrap().len(), 7);
    assert_eq!(body["statusBreakdown"]["succeeded"], 1);
    assert_eq!(body["statusBreakdown"]["pending"], 1);

    let bad_dates = admin(
        Request::builder()
            .uri("/admin/payments/analytics?startDate=2024-05-02&endDate=2024-05-01")
            .body(Body::empty())
            .unwrap(),
    );
    let (status, _) = send(app(&h), bad_dates).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
