use crate::domain::order::{Order, OrderPatch};
use crate::repo::store::OrderStore;
use anyhow::Result;
use sqlx::{PgPool, Postgres, Row, Transaction};

#[derive(Clone)]
pub struct OrdersRepo {
    pub pool: PgPool,
}

impl OrdersRepo {
    pub async fn update_order_tx(
        tx: &mut Transaction<'_, Postgres>,
        order_id: &str,
        patch: &OrderPatch,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE orders SET
                payment_status = $2,
                status = COALESCE($3, status),
                updated_at = now()
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(patch.payment_status.as_str())
        .bind(patch.status.map(|s| s.as_str()))
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if updated == 0 {
            anyhow::bail!("order {order_id} not found");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl OrderStore for OrdersRepo {
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT order_id, customer_id, status, payment_status FROM orders WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            let status: String = r.get("status");
            let payment_status: String = r.get("payment_status");
            Ok(Order {
                order_id: r.get("order_id"),
                customer_id: r.get("customer_id"),
                status: status.parse()?,
                payment_status: payment_status.parse()?,
            })
        })
        .transpose()
    }
}
