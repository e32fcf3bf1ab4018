use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => OrderStatus::Pending,
            "confirmed" => OrderStatus::Confirmed,
            "processing" => OrderStatus::Processing,
            "shipped" => OrderStatus::Shipped,
            "delivered" => OrderStatus::Delivered,
            "cancelled" => OrderStatus::Cancelled,
            "refunded" => OrderStatus::Refunded,
            other => anyhow::bail!("unknown order status: {other}"),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPaymentStatus {
    Pending,
    Processing,
    Paid,
    PartiallyRefunded,
    Refunded,
    Failed,
    Canceled,
}

impl OrderPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderPaymentStatus::Pending => "pending",
            OrderPaymentStatus::Processing => "processing",
            OrderPaymentStatus::Paid => "paid",
            OrderPaymentStatus::PartiallyRefunded => "partially_refunded",
            OrderPaymentStatus::Refunded => "refunded",
            OrderPaymentStatus::Failed => "failed",
            OrderPaymentStatus::Canceled => "canceled",
        }
    }
}

impl FromStr for OrderPaymentStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => OrderPaymentStatus::Pending,
            "processing" => OrderPaymentStatus::Processing,
            "paid" => OrderPaymentStatus::Paid,
            "partially_refunded" => OrderPaymentStatus::PartiallyRefunded,
            "refunded" => OrderPaymentStatus::Refunded,
            "failed" => OrderPaymentStatus::Failed,
            "canceled" => OrderPaymentStatus::Canceled,
            other => anyhow::bail!("unknown order payment status: {other}"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub customer_id: Option<String>,
    pub status: OrderStatus,
    pub payment_status: OrderPaymentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPatch {
    pub payment_status: OrderPaymentStatus,
    pub status: Option<OrderStatus>,
}

impl Order {
    pub fn apply(&mut self, patch: &OrderPatch) {
        self.payment_status = patch.payment_status;
        if let Some(status) = patch.status {
            self.status = status;
        }
    }

    pub fn belongs_to(&self, customer_id: &str) -> bool {
        self.customer_id.as_deref() == Some(customer_id)
    }
}
