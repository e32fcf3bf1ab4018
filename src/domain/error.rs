use crate::domain::money::MoneyError;
use crate::domain::payment::PaymentStatus;
use crate::gateways::GatewayError;
use axum::http::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("order belongs to a different customer")]
    Forbidden,
    #[error("idempotency key reused with a different payload")]
    IdempotencyConflict,
    #[error("cannot apply {trigger} to a {from} payment")]
    InvalidTransition {
        from: PaymentStatus,
        trigger: &'static str,
    },
    #[error("payment in status {0} cannot be refunded")]
    PaymentNotRefundable(PaymentStatus),
    #[error("refund of {requested} minor units exceeds remaining balance of {remaining}")]
    RefundExceedsBalance { requested: i64, remaining: i64 },
    #[error("payment was modified concurrently")]
    ConcurrentModification,
    #[error(transparent)]
    Money(#[from] MoneyError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Validation(_) | PaymentError::Money(_) => StatusCode::BAD_REQUEST,
            PaymentError::NotFound(_) => StatusCode::NOT_FOUND,
            PaymentError::Forbidden => StatusCode::FORBIDDEN,
            PaymentError::IdempotencyConflict
            | PaymentError::InvalidTransition { .. }
            | PaymentError::PaymentNotRefundable(_) => StatusCode::CONFLICT,
            PaymentError::RefundExceedsBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            PaymentError::ConcurrentModification => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::Gateway(GatewayError::Rejected { .. }) => StatusCode::PAYMENT_REQUIRED,
            PaymentError::Gateway(GatewayError::InvalidSignature(_)) => StatusCode::BAD_REQUEST,
            PaymentError::Gateway(GatewayError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Validation(_) => "VALIDATION_ERROR",
            PaymentError::NotFound(_) => "NOT_FOUND",
            PaymentError::Forbidden => "FORBIDDEN",
            PaymentError::IdempotencyConflict => "IDEMPOTENCY_KEY_REUSED_WITH_DIFFERENT_PAYLOAD",
            PaymentError::InvalidTransition { .. } => "INVALID_TRANSITION",
            PaymentError::PaymentNotRefundable(_) => "PAYMENT_NOT_REFUNDABLE",
            PaymentError::RefundExceedsBalance { .. } => "REFUND_EXCEEDS_BALANCE",
            PaymentError::ConcurrentModification => "CONCURRENT_MODIFICATION",
            PaymentError::Money(MoneyError::CurrencyMismatch { .. }) => "CURRENCY_MISMATCH",
            PaymentError::Money(_) => "INVALID_AMOUNT",
            PaymentError::Gateway(GatewayError::Rejected { .. }) => "GATEWAY_REJECTED",
            PaymentError::Gateway(GatewayError::InvalidSignature(_)) => "INVALID_SIGNATURE",
            PaymentError::Gateway(GatewayError::Unavailable(_)) => "GATEWAY_UNAVAILABLE",
            PaymentError::Store(_) => "INTERNAL_ERROR",
        }
    }

    pub fn public_message(&self) -> String {
        match self {
            PaymentError::Validation(msg) => msg.clone(),
            PaymentError::Gateway(GatewayError::Rejected { .. }) => {
                "the payment was declined".to_string()
            }
            PaymentError::Gateway(GatewayError::Unavailable(_))
            | PaymentError::ConcurrentModification => {
                "payment service temporarily unavailable, please retry".to_string()
            }
            PaymentError::Gateway(GatewayError::InvalidSignature(_)) => {
                "invalid signature".to_string()
            }
            PaymentError::Store(_) => "payment processing failed".to_string(),
            other => other.to_string(),
        }
    }

    /// Gateway decline codes are passed through, free-text messages are not.
    pub fn public_details(&self) -> Option<String> {
        match self {
            PaymentError::Gateway(GatewayError::Rejected { code, .. }) => Some(code.clone()),
            _ => None,
        }
    }
}
