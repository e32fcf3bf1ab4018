use crate::domain::money::Money;
use crate::domain::payment::PaymentMethodDetails;
use crate::gateways::{
    signature, stripe, CreatedIntent, GatewayError, GatewayEvent, GatewayRefundRequest,
    IntentRequest, IntentSnapshot, PaymentGateway, RefundSnapshot,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

pub struct MockGateway {
    pub behavior: String,
    pub webhook_tolerance_secs: i64,
    transient_failures: AtomicU32,
    gateway_calls: AtomicU32,
    intents: Mutex<HashMap<String, (CreatedIntent, Money)>>,
    refunds: Mutex<HashMap<String, RefundSnapshot>>,
}

impl MockGateway {
    pub fn new(behavior: &str) -> Self {
        Self {
            behavior: behavior.to_string(),
            webhook_tolerance_secs: signature::DEFAULT_TOLERANCE_SECS,
            transient_failures: AtomicU32::new(0),
            gateway_calls: AtomicU32::new(0),
            intents: Mutex::new(HashMap::new()),
            refunds: Mutex::new(HashMap::new()),
        }
    }

    /// The next `n` calls fail with `GatewayError::Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// Calls that reached the gateway, including failed ones.
    pub fn calls(&self) -> u32 {
        self.gateway_calls.load(Ordering::SeqCst)
    }

    /// Distinct intents created, after idempotency-key collapsing.
    pub fn intents_created(&self) -> usize {
        self.intents.lock().map(|m| m.len()).unwrap_or(0)
    }

    fn enter(&self) -> Result<(), GatewayError> {
        self.gateway_calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed || self.behavior == "ALWAYS_TIMEOUT" {
            return Err(GatewayError::Unavailable("mock timeout".to_string()));
        }
        Ok(())
    }

    fn find_intent(&self, intent_id: &str) -> Result<Money, GatewayError> {
        let intents = self
            .intents
            .lock()
            .map_err(|_| GatewayError::Unavailable("mock state poisoned".to_string()))?;
        intents
            .values()
            .find(|(created, _)| created.intent_id == intent_id)
            .map(|(_, amount)| amount.clone())
            .ok_or_else(|| GatewayError::Rejected {
                code: "resource_missing".to_string(),
                message: format!("no such payment_intent: {intent_id}"),
            })
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<CreatedIntent, GatewayError> {
        self.enter()?;
        let mut intents = self
            .intents
            .lock()
            .map_err(|_| GatewayError::Unavailable("mock state poisoned".to_string()))?;
        let (created, _) = intents
            .entry(request.idempotency_key.clone())
            .or_insert_with(|| {
                let id = uuid::Uuid::new_v4().simple().to_string();
                (
                    CreatedIntent {
                        intent_id: format!("pi_mock_{id}"),
                        client_secret: format!("pi_mock_{id}_secret"),
                    },
                    request.amount.clone(),
                )
            });
        Ok(created.clone())
    }

    async fn confirm_intent(
        &self,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<IntentSnapshot, GatewayError> {
        self.enter()?;
        let amount = self.find_intent(intent_id)?;

        let mut snapshot = IntentSnapshot {
            intent_id: intent_id.to_string(),
            payment_method: Some("card".to_string()),
            method_details: Some(PaymentMethodDetails {
                method_type: Some("card".to_string()),
                brand: Some("visa".to_string()),
                last4: payment_method
                    .get(payment_method.len().saturating_sub(4)..)
                    .map(str::to_string),
            }),
            ..IntentSnapshot::default()
        };

        match self.behavior.as_str() {
            "ALWAYS_FAILURE" => {
                return Err(GatewayError::Rejected {
                    code: "card_declined".to_string(),
                    message: "mock decline".to_string(),
                })
            }
            "REQUIRES_ACTION" => {
                snapshot.status = "requires_action".to_string();
                snapshot.next_action = Some(serde_json::json!({
                    "type": "redirect_to_url",
                    "redirect_to_url": {"url": "https://mock.gateway/3ds"}
                }));
            }
            "PROCESSING" => snapshot.status = "processing".to_string(),
            _ => {
                let fee = (amount.minor() * 2 + 50) / 100;
                snapshot.status = "succeeded".to_string();
                snapshot.receipt_url = Some(format!("https://mock.gateway/receipts/{intent_id}"));
                snapshot.fee_minor = Some(fee);
                snapshot.net_minor = Some(amount.minor() - fee);
                snapshot.risk_score = Some(10);
                snapshot.risk_level = Some("normal".to_string());
            }
        }

        Ok(snapshot)
    }

    async fn create_refund(
        &self,
        request: &GatewayRefundRequest,
    ) -> Result<RefundSnapshot, GatewayError> {
        self.enter()?;
        let intent_amount = self.find_intent(&request.intent_id)?;
        let mut refunds = self
            .refunds
            .lock()
            .map_err(|_| GatewayError::Unavailable("mock state poisoned".to_string()))?;
        let snapshot = refunds
            .entry(request.idempotency_key.clone())
            .or_insert_with(|| RefundSnapshot {
                refund_id: format!("re_mock_{}", uuid::Uuid::new_v4().simple()),
                amount: request.amount.clone().unwrap_or(intent_amount),
                status: "succeeded".to_string(),
                reason: Some(request.reason.as_str().to_string()),
            });
        Ok(snapshot.clone())
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
        secret: &str,
    ) -> Result<GatewayEvent, GatewayError> {
        signature::verify(
            payload,
            signature_header,
            secret,
            self.webhook_tolerance_secs,
            chrono::Utc::now(),
        )?;
        stripe::parse_event(payload)
    }
}
