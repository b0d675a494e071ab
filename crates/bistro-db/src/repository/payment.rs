//! # Payment Repository
//!
//! Payments are appended, never edited. An order may carry several
//! (split tender); the order status, not the sum, decides "paid".

use bistro_core::OrderPayment;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

/// Repository for order payments.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Records a payment within the caller's transaction.
    pub async fn insert(conn: &mut SqliteConnection, payment: &OrderPayment) -> DbResult<()> {
        debug!(
            order_id = %payment.order_id,
            method = ?payment.method,
            amount_cents = payment.amount_cents,
            "Recording payment"
        );

        sqlx::query(
            r#"
            INSERT INTO order_payments (id, order_id, method, amount_cents, device_id, paid_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.order_id)
        .bind(payment.method)
        .bind(payment.amount_cents)
        .bind(&payment.device_id)
        .bind(payment.paid_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Gets all payments for an order, oldest first.
    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<OrderPayment>> {
        let payments = sqlx::query_as::<_, OrderPayment>(
            r#"
            SELECT id, order_id, method, amount_cents, device_id, paid_at
            FROM order_payments
            WHERE order_id = ?1
            ORDER BY paid_at, rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// Gets total amount paid for an order.
    pub async fn total_paid(&self, order_id: &str) -> DbResult<i64> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(amount_cents), 0) FROM order_payments WHERE order_id = ?1",
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, seed_order};
    use bistro_core::PaymentMethod;
    use chrono::Utc;
    use uuid::Uuid;

    fn payment(order_id: &str, method: PaymentMethod, amount_cents: i64) -> OrderPayment {
        OrderPayment {
            id: Uuid::new_v4().to_string(),
            order_id: order_id.to_string(),
            method,
            amount_cents,
            device_id: Some("till-1".to_string()),
            paid_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_split_tender_sum() {
        let db = db().await;
        let (order, _) = seed_order(&db, 2, None).await;

        let mut tx = db.begin().await.unwrap();
        PaymentRepository::insert(&mut tx, &payment(&order.id, PaymentMethod::Cash, 600))
            .await
            .unwrap();
        PaymentRepository::insert(&mut tx, &payment(&order.id, PaymentMethod::Twint, 500))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let payments = db.payments().list_for_order(&order.id).await.unwrap();
        assert_eq!(payments.len(), 2);
        assert_eq!(payments[0].method, PaymentMethod::Cash);
        assert_eq!(db.payments().total_paid(&order.id).await.unwrap(), 1100);
        assert_eq!(db.payments().total_paid("nope").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_payment_for_missing_order_rejected() {
        let db = db().await;
        let mut tx = db.begin().await.unwrap();
        let err = PaymentRepository::insert(&mut tx, &payment("ghost", PaymentMethod::Card, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::DbError::ForeignKeyViolation { .. }));
    }
}
