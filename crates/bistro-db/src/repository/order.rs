//! # Order Repository
//!
//! Database operations for orders and order lines.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. CREATE (one transaction, driven by the engine)                     │
//! │     └── insert_order() + insert_lines() + ledger sale entries          │
//! │                                                                         │
//! │  2. TRANSITION                                                         │
//! │     └── transition_status(from, to)                                    │
//! │         UPDATE … WHERE id = ? AND status = 'from'                      │
//! │         0 rows → somebody else got there first                         │
//! │                                                                         │
//! │  3. (OPTIONAL) CLEANUP                                                 │
//! │     └── delete_if_pending() → lines, payments cascade                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bistro_core::{Order, OrderLine, OrderStatus};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;

const ORDER_COLUMNS: &str = "id, customer_id, contact_email, total_cents, status, origin, \
                             payment_attempt_id, created_at, updated_at";

const LINE_COLUMNS: &str = "id, order_id, line_type, product_id, title, quantity, \
                            unit_price_cents, parent_line_id, menu_slot_id, slot_name, created_at";

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Reads (pool)
    // -------------------------------------------------------------------------

    /// Gets an order by ID.
    pub async fn get(&self, id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::find(&mut conn, id).await
    }

    /// Gets all lines of an order, in insertion order.
    pub async fn get_lines(&self, order_id: &str) -> DbResult<Vec<OrderLine>> {
        let mut conn = self.pool.acquire().await?;
        Self::lines_of(&mut conn, order_id).await
    }

    /// Gets every order created for a payment attempt, oldest first.
    pub async fn find_by_attempt_id(&self, attempt_id: &str) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_attempt_id = ?1 \
             ORDER BY created_at, rowid"
        ))
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Lists orders in a status, newest first.
    pub async fn list_by_status(&self, status: OrderStatus, limit: u32) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    // -------------------------------------------------------------------------
    // Transaction-scoped operations
    // -------------------------------------------------------------------------

    /// Gets an order by ID on the given connection.
    pub async fn find(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(order)
    }

    /// Gets the lines of an order on the given connection.
    pub async fn lines_of(conn: &mut SqliteConnection, order_id: &str) -> DbResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "SELECT {LINE_COLUMNS} FROM order_lines WHERE order_id = ?1 ORDER BY rowid"
        ))
        .bind(order_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(lines)
    }

    /// Inserts an order row.
    pub async fn insert_order(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, total_cents = order.total_cents, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, customer_id, contact_email, total_cents, status, origin,
                payment_attempt_id, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&order.id)
        .bind(&order.customer_id)
        .bind(&order.contact_email)
        .bind(order.total_cents)
        .bind(order.status)
        .bind(order.origin)
        .bind(&order.payment_attempt_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Inserts order lines. Bundles must precede their components.
    ///
    /// ## Snapshot Pattern
    /// Title, unit price and slot name are copied into the line so later
    /// catalog edits never rewrite history.
    pub async fn insert_lines(conn: &mut SqliteConnection, lines: &[OrderLine]) -> DbResult<()> {
        for line in lines {
            sqlx::query(
                r#"
                INSERT INTO order_lines (
                    id, order_id, line_type, product_id, title, quantity,
                    unit_price_cents, parent_line_id, menu_slot_id, slot_name, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&line.id)
            .bind(&line.order_id)
            .bind(line.line_type)
            .bind(&line.product_id)
            .bind(&line.title)
            .bind(line.quantity)
            .bind(line.unit_price_cents)
            .bind(&line.parent_line_id)
            .bind(&line.menu_slot_id)
            .bind(&line.slot_name)
            .bind(line.created_at)
            .execute(&mut *conn)
            .await?;
        }

        debug!(count = lines.len(), "Inserted order lines");
        Ok(())
    }

    /// Moves an order from `from` to `to` only if it is still in `from`.
    ///
    /// ## Returns
    /// * `true` - the row changed
    /// * `false` - missing order, or its status was no longer `from`
    pub async fn transition_status(
        conn: &mut SqliteConnection,
        id: &str,
        from: OrderStatus,
        to: OrderStatus,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE orders SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Deletes an order if it is still pending and none of its lines was
    /// handed over. Lines and payments cascade.
    pub async fn delete_if_pending(conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM orders
            WHERE id = ?1
              AND status = 'pending'
              AND NOT EXISTS (
                  SELECT 1
                  FROM order_line_redemptions r
                  JOIN order_lines l ON l.id = r.order_line_id
                  WHERE l.order_id = orders.id
              )
            "#,
        )
        .bind(id)
        .execute(&mut *conn)
        .await?;

        let deleted = result.rows_affected() == 1;
        debug!(id = %id, deleted, "Delete-if-pending");
        Ok(deleted)
    }

    /// Ids of pending orders of an attempt, except `keep_id`.
    pub async fn pending_ids_by_attempt_except(
        conn: &mut SqliteConnection,
        attempt_id: &str,
        keep_id: &str,
    ) -> DbResult<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT id FROM orders \
             WHERE payment_attempt_id = ?1 AND id <> ?2 AND status = 'pending' \
             ORDER BY rowid",
        )
        .bind(attempt_id)
        .bind(keep_id)
        .fetch_all(&mut *conn)
        .await?;

        Ok(ids)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{db, seed_order};

    #[tokio::test]
    async fn test_insert_and_read_back() {
        let db = db().await;
        let (order, line) = seed_order(&db, 2, Some("attempt-1")).await;

        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.total_cents, 1100);
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.contact_email.as_deref(), Some("guest@example.com"));

        let lines = db.orders().get_lines(&order.id).await.unwrap();
        assert_eq!(lines, vec![line]);
    }

    #[tokio::test]
    async fn test_transition_is_conditional() {
        let db = db().await;
        let (order, _) = seed_order(&db, 1, None).await;

        let mut tx = db.begin().await.unwrap();
        assert!(OrderRepository::transition_status(
            &mut tx,
            &order.id,
            OrderStatus::Pending,
            OrderStatus::Paid
        )
        .await
        .unwrap());
        // second attempt sees 'paid', not 'pending'
        assert!(!OrderRepository::transition_status(
            &mut tx,
            &order.id,
            OrderStatus::Pending,
            OrderStatus::Paid
        )
        .await
        .unwrap());
        tx.commit().await.unwrap();

        let stored = db.orders().get(&order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_delete_if_pending_cascades() {
        let db = db().await;
        let (order, _) = seed_order(&db, 1, None).await;

        let mut tx = db.begin().await.unwrap();
        assert!(OrderRepository::delete_if_pending(&mut tx, &order.id).await.unwrap());
        assert!(!OrderRepository::delete_if_pending(&mut tx, &order.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(db.orders().get(&order.id).await.unwrap().is_none());
        assert!(db.orders().get_lines(&order.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handed_over_order_is_kept() {
        let db = db().await;
        let (order, line) = seed_order(&db, 2, None).await;
        db.redemptions()
            .redeem_unredeemed_by_order_line_ids(&[line.id.clone()])
            .await
            .unwrap();

        let mut tx = db.begin().await.unwrap();
        assert!(!OrderRepository::delete_if_pending(&mut tx, &order.id).await.unwrap());
        tx.commit().await.unwrap();

        assert!(db.orders().get(&order.id).await.unwrap().is_some());
        assert!(db.redemptions().get(&line.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pending_ids_by_attempt_except() {
        let db = db().await;
        let (keep, _) = seed_order(&db, 1, Some("attempt-9")).await;
        let (dup, _) = seed_order(&db, 1, Some("attempt-9")).await;
        let (paid, _) = seed_order(&db, 1, Some("attempt-9")).await;
        seed_order(&db, 1, Some("other")).await;

        let mut tx = db.begin().await.unwrap();
        OrderRepository::transition_status(&mut tx, &paid.id, OrderStatus::Pending, OrderStatus::Paid)
            .await
            .unwrap();
        let ids = OrderRepository::pending_ids_by_attempt_except(&mut tx, "attempt-9", &keep.id)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(ids, vec![dup.id]);
        assert_eq!(db.orders().find_by_attempt_id("attempt-9").await.unwrap().len(), 3);
        assert_eq!(
            db.orders()
                .list_by_status(OrderStatus::Paid, 10)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
