#![allow(dead_code)]

use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use storefront_payments::domain::order::{Order, OrderPaymentStatus, OrderStatus};
use storefront_payments::domain::payment::{ConfirmRequest, CreateIntentRequest, Payment};
use storefront_payments::gateways::mock::MockGateway;
use storefront_payments::gateways::signature;
use storefront_payments::repo::memory::MemoryStore;
use storefront_payments::repo::store::PaymentStore;
use storefront_payments::service::payment_service::{PaymentService, PaymentSettings};
use storefront_payments::service::retry::RetryPolicy;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const CUSTOMER: &str = "cust_1";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<MockGateway>,
    pub service: PaymentService,
}

pub fn harness(behavior: &str) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(MockGateway::new(behavior));
    let service = PaymentService {
        payments: store.clone(),
        orders: store.clone(),
        ledger: store.clone(),
        gateway: gateway.clone(),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        },
        settings: PaymentSettings {
            publishable_key: "pk_test_123".to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            fraud_risk_threshold: 75,
            default_currency: "INR".to_string(),
        },
    };
    Harness {
        store,
        gateway,
        service,
    }
}

pub fn seed_order(store: &MemoryStore, order_id: &str, customer_id: Option<&str>) {
    store
        .insert_order(Order {
            order_id: order_id.to_string(),
            customer_id: customer_id.map(str::to_string),
            status: OrderStatus::Pending,
            payment_status: OrderPaymentStatus::Pending,
        })
        .unwrap();
}

pub fn intent_request(order_id: &str, minor: i64, currency: &str) -> CreateIntentRequest {
    CreateIntentRequest {
        order_id: Some(order_id.to_string()),
        amount: Some(Decimal::new(minor, 2)),
        currency: Some(currency.to_string()),
    }
}

pub fn confirm_request(intent_id: &str) -> ConfirmRequest {
    ConfirmRequest {
        payment_intent_id: Some(intent_id.to_string()),
        payment_method_id: Some("pm_card_4242".to_string()),
    }
}

/// Creates an INR intent for a fresh order owned by `CUSTOMER`.
pub async fn pending_payment(h: &Harness, order_id: &str, minor: i64) -> Payment {
    seed_order(&h.store, order_id, Some(CUSTOMER));
    let created = h
        .service
        .create_intent(
            intent_request(order_id, minor, "INR"),
            Some(CUSTOMER.to_string()),
            None,
        )
        .await
        .unwrap();
    load(h, created.payment_id).await
}

/// A payment that has been confirmed successfully.
pub async fn succeeded_payment(h: &Harness, order_id: &str, minor: i64) -> Payment {
    let p = pending_payment(h, order_id, minor).await;
    h.service.confirm(confirm_request(&p.intent_id)).await.unwrap();
    load(h, p.payment_id).await
}

pub async fn load(h: &Harness, payment_id: Uuid) -> Payment {
    h.store.find(payment_id).await.unwrap().unwrap()
}

pub fn intent_object(intent_id: &str, status: &str) -> Value {
    json!({
        "id": intent_id,
        "status": status,
        "payment_method": {"id": "pm_1", "type": "card", "card": {"brand": "visa", "last4": "4242"}},
        "latest_charge": {
            "id": "ch_1",
            "receipt_url": format!("https://pay.example/r/{intent_id}"),
            "balance_transaction": {"id": "txn_1", "fee": 59, "net": 1940},
            "outcome": {"risk_score": 20, "risk_level": "normal"}
        }
    })
}

pub fn event_body(event_id: &str, event_type: &str, object: Value) -> Vec<u8> {
    json!({
        "id": event_id,
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "data": {"object": object}
    })
    .to_string()
    .into_bytes()
}

pub fn sign(body: &[u8]) -> String {
    signature::sign(body, WEBHOOK_SECRET, chrono::Utc::now().timestamp()).unwrap()
}
