use crate::domain::order::{OrderPatch, OrderPaymentStatus, OrderStatus};
use crate::domain::payment::PaymentStatus;

pub fn order_payment_status(status: PaymentStatus) -> OrderPaymentStatus {
    match status {
        PaymentStatus::Pending => OrderPaymentStatus::Pending,
        PaymentStatus::Processing => OrderPaymentStatus::Processing,
        PaymentStatus::Succeeded => OrderPaymentStatus::Paid,
        PaymentStatus::PartiallyRefunded => OrderPaymentStatus::PartiallyRefunded,
        PaymentStatus::Refunded => OrderPaymentStatus::Refunded,
        PaymentStatus::Failed => OrderPaymentStatus::Failed,
        PaymentStatus::Canceled => OrderPaymentStatus::Canceled,
    }
}

pub fn project(from: PaymentStatus, to: PaymentStatus) -> Option<OrderPatch> {
    if from == to {
        return None;
    }
    let status = match to {
        PaymentStatus::Succeeded => Some(OrderStatus::Confirmed),
        PaymentStatus::Refunded => Some(OrderStatus::Refunded),
        _ => None,
    };
    Some(OrderPatch {
        payment_status: order_payment_status(to),
        status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_confirms_order() {
        let patch = project(PaymentStatus::Pending, PaymentStatus::Succeeded).unwrap();
        assert_eq!(patch.payment_status, OrderPaymentStatus::Paid);
        assert_eq!(patch.status, Some(OrderStatus::Confirmed));
    }

    #[test]
    fn partial_refund_leaves_order_status_alone() {
        let patch = project(PaymentStatus::Succeeded, PaymentStatus::PartiallyRefunded).unwrap();
        assert_eq!(patch.payment_status, OrderPaymentStatus::PartiallyRefunded);
        assert_eq!(patch.status, None);
    }

    #[test]
    fn full_refund_marks_order_refunded() {
        let patch = project(PaymentStatus::PartiallyRefunded, PaymentStatus::Refunded).unwrap();
        assert_eq!(patch.status, Some(OrderStatus::Refunded));
    }

    #[test]
    fn failure_only_touches_payment_status() {
        let patch = project(PaymentStatus::Processing, PaymentStatus::Failed).unwrap();
        assert_eq!(patch.payment_status, OrderPaymentStatus::Failed);
        assert_eq!(patch.status, None);
    }

    #[test]
    fn same_status_projects_nothing() {
        assert!(project(PaymentStatus::Processing, PaymentStatus::Processing).is_none());
    }
}
