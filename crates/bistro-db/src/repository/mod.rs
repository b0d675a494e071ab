//! # Repository Module
//!
//! Database repository implementations for Bistro Ledger.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Two Ways In                                          │
//! │                                                                         │
//! │  Reads / self-contained writes          Part of a larger transaction    │
//! │  ─────────────────────────────          ────────────────────────────    │
//! │  db.ledger().current_stock(id)          let mut tx = db.begin().await?; │
//! │  db.orders().get(id)                    OrderRepository::insert_order(  │
//! │  db.redemptions().redeem_…(ids)             &mut tx, &order)            │
//! │       │                                 LedgerRepository::append_batch( │
//! │       │ &self methods use the pool          &mut tx, &entries)          │
//! │       │                                 tx.commit().await?;             │
//! │       ▼                                        │                        │
//! │  SQLite Database  ◄────────────────────────────┘                        │
//! │                                                                         │
//! │  Associated functions taking `&mut SqliteConnection` never touch the   │
//! │  pool, so they compose inside one transaction.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`CatalogRepository`] - Products and menu slots (read-only to the engine)
//! - [`OrderRepository`] - Orders, lines, conditional status changes
//! - [`PaymentRepository`] - Payments per order
//! - [`RedemptionRepository`] - Exactly-once line fulfilment
//! - [`LedgerRepository`] - Append-only stock ledger and projection
//! - [`IdempotencyRepository`] - First-writer-wins request records

pub mod catalog;
pub mod idempotency;
pub mod ledger;
pub mod order;
pub mod payment;
pub mod redemption;

pub use catalog::CatalogRepository;
pub use idempotency::IdempotencyRepository;
pub use ledger::LedgerRepository;
pub use order::OrderRepository;
pub use payment::PaymentRepository;
pub use redemption::RedemptionRepository;

#[cfg(test)]
pub(crate) mod test_support {
    //! Fixtures shared by the repository tests.

    use bistro_core::{
        LineType, MenuSlot, Order, OrderLine, OrderOrigin, OrderStatus, Product, ProductKind,
    };
    use chrono::Utc;
    use uuid::Uuid;

    use crate::{Database, DbConfig};

    pub async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub fn product(id: &str, kind: ProductKind, price_cents: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            name: id.to_string(),
            kind,
            price_cents,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot(id: &str, menu_id: &str, sequence: i64, options: &[&str]) -> MenuSlot {
        MenuSlot {
            id: id.to_string(),
            menu_product_id: menu_id.to_string(),
            name: id.to_string(),
            sequence,
            option_product_ids: options.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn order(total_cents: i64, attempt_id: Option<&str>) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4().to_string(),
            customer_id: None,
            contact_email: Some("guest@example.com".to_string()),
            total_cents,
            status: OrderStatus::Pending,
            origin: OrderOrigin::Storefront,
            payment_attempt_id: attempt_id.map(str::to_string),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn simple_line(order: &Order, product_id: &str, quantity: i64, price: i64) -> OrderLine {
        OrderLine {
            id: Uuid::new_v4().to_string(),
            order_id: order.id.clone(),
            line_type: LineType::Simple,
            product_id: product_id.to_string(),
            title: product_id.to_string(),
            quantity,
            unit_price_cents: price,
            parent_line_id: None,
            menu_slot_id: None,
            slot_name: None,
            created_at: Utc::now(),
        }
    }

    /// Inserts `order` with one simple line of `quantity` × pommes.
    pub async fn seed_order(db: &Database, quantity: i64, attempt_id: Option<&str>) -> (Order, OrderLine) {
        let order = order(550 * quantity, attempt_id);
        let line = simple_line(&order, "pommes", quantity, 550);
        let mut tx = db.begin().await.unwrap();
        crate::OrderRepository::insert_order(&mut tx, &order).await.unwrap();
        crate::OrderRepository::insert_lines(&mut tx, std::slice::from_ref(&line))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (order, line)
    }
}
