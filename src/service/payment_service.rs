use crate::analytics::aggregator::{aggregate, PaymentAnalytics};
use crate::domain::error::PaymentError;
use crate::domain::money::{Currency, Money};
use crate::domain::payment::{
    ConfirmRequest, ConfirmResponse, CreateIntentRequest, CreateIntentResponse, Payment,
    PaymentStatus, RefundReason, RefundRequest, RefundResponse,
};
use crate::domain::webhook::{
    DisputeRecord, OutboxMessage, WebhookAck, WebhookEventRecord, WebhookOutcome,
};
use crate::gateways::{
    GatewayError, GatewayEvent, GatewayEventKind, GatewayRefundRequest, IntentRequest,
    PaymentGateway,
};
use crate::lifecycle::projector;
use crate::lifecycle::transitions::{self, Transition, TransitionContext, Trigger};
use crate::repo::store::{CommitOutcome, OrderStore, PaymentStore, TransitionCommit, WebhookLedger};
use crate::service::retry::{with_backoff, RetryPolicy};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

const MAX_COMMIT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub publishable_key: String,
    pub webhook_secret: String,
    pub fraud_risk_threshold: i32,
    pub default_currency: String,
}

#[derive(Clone)]
pub struct PaymentService {
    pub payments: Arc<dyn PaymentStore>,
    pub orders: Arc<dyn OrderStore>,
    pub ledger: Arc<dyn WebhookLedger>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub retry: RetryPolicy,
    pub settings: PaymentSettings,
}

#[derive(Debug)]
enum Applied {
    Committed,
    Unchanged,
    DuplicateEvent,
}

impl PaymentService {
    pub async fn create_intent(
        &self,
        req: CreateIntentRequest,
        customer_id: Option<String>,
        idempotency_key: Option<String>,
    ) -> Result<CreateIntentResponse, PaymentError> {
        let order_id = req
            .order_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PaymentError::Validation("orderId is required".to_string()))?;
        let decimal = req
            .amount
            .ok_or_else(|| PaymentError::Validation("amount is required".to_string()))?;
        let currency = Currency::parse(
            req.currency
                .as_deref()
                .unwrap_or(&self.settings.default_currency),
        )?;
        let amount = Money::from_decimal(decimal, currency)?;
        if !amount.is_positive() {
            return Err(PaymentError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        let idempotency_key = idempotency_key.filter(|k| !k.trim().is_empty());

        let order = self
            .orders
            .find_order(&order_id)
            .await?
            .ok_or(PaymentError::NotFound("order"))?;
        if let Some(caller) = customer_id.as_deref() {
            if !order.belongs_to(caller) {
                return Err(PaymentError::Forbidden);
            }
        }

        if let Some(key) = &idempotency_key {
            if let Some(found) = self.payments.find_by_idempotency(&order_id, key).await? {
                return self.replay_intent(found, &amount);
            }
        }

        let payment_id = Uuid::new_v4();
        let gateway_key = match &idempotency_key {
            Some(key) => format!("create_intent:{order_id}:{key}"),
            None => format!("create_intent:{payment_id}"),
        };
        let mut metadata = BTreeMap::new();
        metadata.insert("orderId".to_string(), order_id.clone());
        metadata.insert("paymentId".to_string(), payment_id.to_string());
        if let Some(customer) = &customer_id {
            metadata.insert("customerId".to_string(), customer.clone());
        }
        let request = IntentRequest {
            amount: amount.clone(),
            metadata: metadata.clone(),
            idempotency_key: gateway_key,
        };

        let created = with_backoff(&self.retry, "create_intent", || {
            self.gateway.create_intent(&request)
        })
        .await?;

        let now = Utc::now();
        let payment = Payment {
            payment_id,
            intent_id: created.intent_id,
            order_id: order_id.clone(),
            customer_id,
            refunded: Money::zero(amount.currency().clone()),
            amount,
            status: PaymentStatus::Pending,
            payment_method: "card".to_string(),
            method_details: None,
            fee: None,
            net: None,
            risk_score: None,
            fraud_detected: false,
            failure_reason: None,
            receipt_url: None,
            client_secret: created.client_secret,
            idempotency_key: idempotency_key.clone(),
            metadata: json!(metadata),
            refunds: Vec::new(),
            created_at: now,
            processed_at: None,
            updated_at: now,
            version: 0,
        };

        if let Err(err) = self.payments.insert(&payment).await {
            // A concurrent request with the same key may have won the insert.
            if let Some(key) = &idempotency_key {
                if let Some(found) = self.payments.find_by_idempotency(&order_id, key).await? {
                    return self.replay_intent(found, &payment.amount);
                }
            }
            return Err(err.into());
        }

        tracing::info!(
            payment_id = %payment.payment_id,
            intent_id = %payment.intent_id,
            order_id = %payment.order_id,
            amount = %payment.amount,
            "payment intent created"
        );

        Ok(CreateIntentResponse {
            payment_id: payment.payment_id,
            client_secret: payment.client_secret,
            publishable_key: self.settings.publishable_key.clone(),
            amount: payment.amount.to_decimal(),
            currency: payment.amount.currency().code().to_string(),
            status: "created".to_string(),
        })
    }

    fn replay_intent(
        &self,
        found: Payment,
        amount: &Money,
    ) -> Result<CreateIntentResponse, PaymentError> {
        if found.amount != *amount {
            return Err(PaymentError::IdempotencyConflict);
        }
        tracing::debug!(payment_id = %found.payment_id, "replaying idempotent intent creation");
        Ok(CreateIntentResponse {
            payment_id: found.payment_id,
            client_secret: found.client_secret,
            publishable_key: self.settings.publishable_key.clone(),
            amount: found.amount.to_decimal(),
            currency: found.amount.currency().code().to_string(),
            status: "created".to_string(),
        })
    }

    pub async fn confirm(&self, req: ConfirmRequest) -> Result<ConfirmResponse, PaymentError> {
        let intent_id = req
            .payment_intent_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PaymentError::Validation("paymentIntentId is required".to_string()))?;
        let method_id = req
            .payment_method_id
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| PaymentError::Validation("paymentMethodId is required".to_string()))?;

        let payment = self
            .payments
            .find_by_intent(&intent_id)
            .await?
            .ok_or(PaymentError::NotFound("payment"))?;

        if payment.status == PaymentStatus::Succeeded {
            return Ok(ConfirmResponse {
                status: PaymentStatus::Succeeded.as_str().to_string(),
                payment_id: payment.payment_id,
                requires_action: false,
                next_action: None,
            });
        }
        if !payment.status.is_open() {
            return Err(PaymentError::InvalidTransition {
                from: payment.status,
                trigger: "confirm",
            });
        }

        let snapshot = with_backoff(&self.retry, "confirm_intent", || {
            self.gateway.confirm_intent(&intent_id, &method_id)
        })
        .await?;

        let payment_id = payment.payment_id;
        self.apply_transition(payment, Trigger::Confirmed(&snapshot), None)
            .await?;

        Ok(ConfirmResponse {
            status: snapshot.status.clone(),
            payment_id,
            requires_action: snapshot.requires_action(),
            next_action: snapshot.next_action.clone(),
        })
    }

    pub async fn handle_webhook(
        &self,
        raw: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, PaymentError> {
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                tracing::warn!("webhook rejected: missing signature header");
                GatewayError::InvalidSignature("missing signature header".to_string())
            })?;

        let event = self
            .gateway
            .verify_webhook(raw, signature, &self.settings.webhook_secret)
            .map_err(|err| {
                tracing::warn!("webhook rejected: {}", err);
                err
            })?;

        if self.ledger.seen(&event.id).await? {
            tracing::debug!(event_id = %event.id, "duplicate webhook delivery");
            return Ok(ack(&event, "duplicate"));
        }

        let outcome = match &event.kind {
            GatewayEventKind::IntentSucceeded(s) => {
                self.reconcile_intent(&event, Trigger::IntentSucceeded(s)).await?
            }
            GatewayEventKind::IntentFailed(s) => {
                self.reconcile_intent(&event, Trigger::IntentFailed(s)).await?
            }
            GatewayEventKind::IntentCanceled(s) => {
                self.reconcile_intent(&event, Trigger::IntentCanceled(s)).await?
            }
            GatewayEventKind::DisputeCreated(d) => {
                let record = ledger_record(&event, WebhookOutcome::DisputeRecorded);
                let dispute = DisputeRecord {
                    dispute_id: d.dispute_id.clone(),
                    event_id: event.id.clone(),
                    intent_id: d.intent_id.clone(),
                    charge_id: d.charge_id.clone(),
                    amount: d.amount.clone(),
                    reason: d.reason.clone(),
                    status: d.status.clone(),
                    created_at: Utc::now(),
                };
                if self.ledger.record_dispute(&record, &dispute).await? {
                    tracing::warn!(
                        dispute_id = %dispute.dispute_id,
                        intent_id = ?dispute.intent_id,
                        reason = ?dispute.reason,
                        "payment dispute opened"
                    );
                    Some(WebhookOutcome::DisputeRecorded)
                } else {
                    None
                }
            }
            GatewayEventKind::Malformed(reason) => {
                let recorded = self
                    .ledger
                    .record(&ledger_record(&event, WebhookOutcome::Rejected))
                    .await?;
                if recorded {
                    tracing::warn!(event_id = %event.id, event_type = %event.event_type, "unparseable webhook object: {}", reason);
                }
                recorded.then_some(WebhookOutcome::Rejected)
            }
            GatewayEventKind::Unknown => {
                let recorded = self
                    .ledger
                    .record(&ledger_record(&event, WebhookOutcome::Ignored))
                    .await?;
                if recorded {
                    tracing::info!(event_id = %event.id, event_type = %event.event_type, "unhandled webhook type");
                }
                recorded.then_some(WebhookOutcome::Ignored)
            }
        };

        Ok(match outcome {
            Some(outcome) => ack(&event, outcome.as_str()),
            None => {
                tracing::debug!(event_id = %event.id, "webhook recorded concurrently");
                ack(&event, "duplicate")
            }
        })
    }

    /// `None` means another delivery of the same event got there first.
    async fn reconcile_intent(
        &self,
        event: &GatewayEvent,
        trigger: Trigger<'_>,
    ) -> Result<Option<WebhookOutcome>, PaymentError> {
        let intent_id = event.intent_id().unwrap_or_default();
        let Some(payment) = self.payments.find_by_intent(intent_id).await? else {
            tracing::warn!(event_id = %event.id, intent_id, "webhook for unknown intent");
            let recorded = self
                .ledger
                .record(&ledger_record(event, WebhookOutcome::UnknownIntent))
                .await?;
            return Ok(recorded.then_some(WebhookOutcome::UnknownIntent));
        };

        let template = ledger_record(event, WebhookOutcome::Applied);
        match self.apply_transition(payment, trigger, Some(template)).await {
            Ok(Applied::Committed) => Ok(Some(WebhookOutcome::Applied)),
            Ok(Applied::Unchanged) => Ok(Some(WebhookOutcome::Noop)),
            Ok(Applied::DuplicateEvent) => Ok(None),
            Err(err @ PaymentError::InvalidTransition { .. }) => {
                tracing::warn!(event_id = %event.id, intent_id, "webhook rejected by state machine: {}", err);
                let recorded = self
                    .ledger
                    .record(&ledger_record(event, WebhookOutcome::Rejected))
                    .await?;
                Ok(recorded.then_some(WebhookOutcome::Rejected))
            }
            Err(err) => Err(err),
        }
    }

    pub async fn refund(&self, req: RefundRequest) -> Result<RefundResponse, PaymentError> {
        let payment_id = req
            .payment_id
            .ok_or_else(|| PaymentError::Validation("paymentId is required".to_string()))?;
        let reason = match req.reason.as_deref() {
            None => RefundReason::RequestedByCustomer,
            Some(raw) => RefundReason::parse(raw).ok_or_else(|| {
                PaymentError::Validation(format!("unsupported refund reason: {raw}"))
            })?,
        };

        let payment = self
            .payments
            .find(payment_id)
            .await?
            .ok_or(PaymentError::NotFound("payment"))?;
        let requested = req
            .amount
            .map(|d| Money::from_decimal(d, payment.amount.currency().clone()))
            .transpose()?;
        let amount = transitions::check_refund(&payment, requested.as_ref())?;

        let mut metadata = BTreeMap::new();
        metadata.insert("orderId".to_string(), payment.order_id.clone());
        metadata.insert("paymentId".to_string(), payment.payment_id.to_string());
        let request = GatewayRefundRequest {
            intent_id: payment.intent_id.clone(),
            amount: Some(amount.clone()),
            reason,
            metadata,
            idempotency_key: format!(
                "refund:{}:{}:{}",
                payment.payment_id,
                payment.version,
                amount.minor()
            ),
        };

        let snapshot = with_backoff(&self.retry, "create_refund", || {
            self.gateway.create_refund(&request)
        })
        .await?;
        if !snapshot.is_settled_or_pending() {
            tracing::error!(
                payment_id = %payment.payment_id,
                refund_id = %snapshot.refund_id,
                status = %snapshot.status,
                "gateway refund did not go through"
            );
            return Err(GatewayError::Rejected {
                code: "refund_failed".to_string(),
                message: format!("refund {} ended in {}", snapshot.refund_id, snapshot.status),
            }
            .into());
        }

        self.apply_transition(payment, Trigger::Refunded(&snapshot), None)
            .await?;

        Ok(RefundResponse {
            refund_id: snapshot.refund_id.clone(),
            amount: snapshot.amount.to_decimal(),
            status: snapshot.status.clone(),
            reason: snapshot
                .reason
                .clone()
                .or_else(|| Some(reason.as_str().to_string())),
        })
    }

    pub async fn analytics(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        currency: Option<String>,
    ) -> Result<PaymentAnalytics, PaymentError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(PaymentError::Validation(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }
        let currency = Currency::parse(
            currency
                .as_deref()
                .unwrap_or(&self.settings.default_currency),
        )?;
        let payments = self.payments.list_created_between(start, end).await?;
        Ok(aggregate(&payments, &currency)?)
    }

    async fn apply_transition(
        &self,
        mut current: Payment,
        trigger: Trigger<'_>,
        event: Option<WebhookEventRecord>,
    ) -> Result<Applied, PaymentError> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let ctx = TransitionContext {
                now: Utc::now(),
                fraud_risk_threshold: self.settings.fraud_risk_threshold,
            };

            let (from, next, refund) = match transitions::apply(&current, trigger, &ctx)? {
                Transition::Unchanged => {
                    if let Some(event) = &event {
                        let noop = WebhookEventRecord {
                            outcome: WebhookOutcome::Noop,
                            ..event.clone()
                        };
                        if !self.ledger.record(&noop).await? {
                            return Ok(Applied::DuplicateEvent);
                        }
                    }
                    tracing::debug!(
                        payment_id = %current.payment_id,
                        status = %current.status,
                        trigger = trigger.name(),
                        "transition is a no-op"
                    );
                    return Ok(Applied::Unchanged);
                }
                Transition::Advanced {
                    from,
                    payment,
                    refund,
                } => (from, payment, refund),
            };

            let commit = TransitionCommit {
                order_patch: projector::project(from, next.status),
                outbox: vec![lifecycle_message(from, &next)],
                refund,
                event: event.clone(),
                payment: next,
            };

            let to = commit.payment.status;
            match self.payments.commit(commit).await? {
                CommitOutcome::Committed => {
                    tracing::info!(
                        payment_id = %current.payment_id,
                        from = %from,
                        to = %to,
                        trigger = trigger.name(),
                        "payment transition committed"
                    );
                    return Ok(Applied::Committed);
                }
                CommitOutcome::DuplicateEvent => return Ok(Applied::DuplicateEvent),
                CommitOutcome::VersionConflict => {
                    tracing::debug!(
                        payment_id = %current.payment_id,
                        attempt,
                        "version conflict, reloading payment"
                    );
                    current = self
                        .payments
                        .find(current.payment_id)
                        .await?
                        .ok_or(PaymentError::NotFound("payment"))?;
                }
            }
        }

        tracing::error!(
            payment_id = %current.payment_id,
            trigger = trigger.name(),
            "gave up after repeated version conflicts"
        );
        Err(PaymentError::ConcurrentModification)
    }
}

fn ledger_record(event: &GatewayEvent, outcome: WebhookOutcome) -> WebhookEventRecord {
    WebhookEventRecord {
        event_id: event.id.clone(),
        event_type: event.event_type.clone(),
        intent_id: event.intent_id().map(str::to_string),
        outcome,
        received_at: Utc::now(),
    }
}

fn ack(event: &GatewayEvent, outcome: &str) -> WebhookAck {
    WebhookAck {
        received: true,
        event_type: event.event_type.clone(),
        outcome: outcome.to_string(),
    }
}

pub fn lifecycle_message(from: PaymentStatus, next: &Payment) -> OutboxMessage {
    let event_type = format!("payment.{}", next.status);
    OutboxMessage {
        payment_id: next.payment_id,
        event_key: format!("{event_type}:{}", next.version + 1),
        payload: json!({
            "paymentId": next.payment_id,
            "intentId": next.intent_id,
            "orderId": next.order_id,
            "customerId": next.customer_id,
            "previousStatus": from.as_str(),
            "status": next.status.as_str(),
            "amountMinor": next.amount.minor(),
            "refundedMinor": next.refunded.minor(),
            "currency": next.amount.currency().code(),
            "fraudDetected": next.fraud_detected,
            "occurredAt": next.updated_at,
        }),
        event_type,
    }
}
