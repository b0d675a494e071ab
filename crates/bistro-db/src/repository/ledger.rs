//! # Inventory Ledger Repository
//!
//! Stock is never stored; it is the sum of signed deltas.
//!
//! ## Ledger Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  inventory_ledger (append-only)                                        │
//! │                                                                         │
//! │  product   delta   reason            provenance                        │
//! │  ───────   ─────   ───────────────   ────────────────────────────       │
//! │  pommes     +50    opening_balance   actor=kitchen                     │
//! │  pommes      -2    sale              order=…, line=…                   │
//! │  pommes      +2    correction        order=… (cancelled)               │
//! │                                                                         │
//! │  current_stock(pommes) = Σ delta = 50                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concurrent appends never conflict: a sum is order-independent, so two
//! tills selling at once can't lose an update. There is no floor at zero
//! here; oversell policy lives in the engine.

use bistro_core::InventoryLedgerEntry;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::DbResult;

const ENTRY_COLUMNS: &str =
    "id, product_id, delta, reason, order_id, order_line_id, device_id, actor, created_at";

/// Repository for the inventory ledger.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    /// Appends entries in their own transaction: all or nothing.
    pub async fn append(&self, entries: &[InventoryLedgerEntry]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::append_batch(&mut tx, entries).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Appends entries within the caller's transaction.
    pub async fn append_batch(
        conn: &mut SqliteConnection,
        entries: &[InventoryLedgerEntry],
    ) -> DbResult<()> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO inventory_ledger (
                    id, product_id, delta, reason,
                    order_id, order_line_id, device_id, actor, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&entry.id)
            .bind(&entry.product_id)
            .bind(entry.delta)
            .bind(entry.reason)
            .bind(&entry.order_id)
            .bind(&entry.order_line_id)
            .bind(&entry.device_id)
            .bind(&entry.actor)
            .bind(entry.created_at)
            .execute(&mut *conn)
            .await?;
        }

        debug!(count = entries.len(), "Appended ledger entries");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Projection
    // -------------------------------------------------------------------------

    /// Current stock of a product. 0 when it has no entries.
    pub async fn current_stock(&self, product_id: &str) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::stock_of(&mut conn, product_id).await
    }

    /// Current stock of many products. Every requested id is present in
    /// the result, with 0 for products without entries.
    pub async fn current_stock_batch(&self, product_ids: &[String]) -> DbResult<HashMap<String, i64>> {
        let mut conn = self.pool.acquire().await?;
        Self::stock_of_many(&mut conn, product_ids).await
    }

    /// Transaction-scoped [`Self::current_stock`].
    pub async fn stock_of(conn: &mut SqliteConnection, product_id: &str) -> DbResult<i64> {
        let stock: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(delta), 0) FROM inventory_ledger WHERE product_id = ?1",
        )
        .bind(product_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(stock)
    }

    /// Transaction-scoped [`Self::current_stock_batch`].
    pub async fn stock_of_many(
        conn: &mut SqliteConnection,
        product_ids: &[String],
    ) -> DbResult<HashMap<String, i64>> {
        let mut stock: HashMap<String, i64> =
            product_ids.iter().map(|id| (id.clone(), 0)).collect();
        if stock.is_empty() {
            return Ok(stock);
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT product_id, COALESCE(SUM(delta), 0) FROM inventory_ledger WHERE product_id IN (",
        );
        let mut separated = query.separated(", ");
        for id in product_ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(") GROUP BY product_id");

        let sums: Vec<(String, i64)> = query.build_query_as().fetch_all(&mut *conn).await?;

        for (product_id, sum) in sums {
            stock.insert(product_id, sum);
        }

        Ok(stock)
    }

    // -------------------------------------------------------------------------
    // History
    // -------------------------------------------------------------------------

    /// Ledger history of a product, newest first.
    pub async fn entries_for_product(
        &self,
        product_id: &str,
        limit: u32,
    ) -> DbResult<Vec<InventoryLedgerEntry>> {
        let entries = sqlx::query_as::<_, InventoryLedgerEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM inventory_ledger WHERE product_id = ?1 \
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))
        .bind(product_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Every entry that references an order, oldest first.
    pub async fn entries_for_order(&self, order_id: &str) -> DbResult<Vec<InventoryLedgerEntry>> {
        let entries = sqlx::query_as::<_, InventoryLedgerEntry>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM inventory_ledger WHERE order_id = ?1 ORDER BY rowid"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::db;
    use bistro_core::{LedgerProvenance, LedgerReason};

    fn entry(product_id: &str, delta: i64, reason: LedgerReason) -> InventoryLedgerEntry {
        InventoryLedgerEntry::new(product_id, delta, reason, LedgerProvenance::by_actor("test"))
    }

    #[tokio::test]
    async fn test_stock_is_sum_of_deltas() {
        let db = db().await;
        let ledger = db.ledger();

        assert_eq!(ledger.current_stock("pommes").await.unwrap(), 0);

        ledger
            .append(&[
                entry("pommes", 50, LedgerReason::OpeningBalance),
                entry("pommes", -2, LedgerReason::Sale),
                entry("cola", 10, LedgerReason::OpeningBalance),
                entry("pommes", 1, LedgerReason::ManualAdjust),
            ])
            .await
            .unwrap();

        assert_eq!(ledger.current_stock("pommes").await.unwrap(), 49);
        assert_eq!(ledger.current_stock("cola").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_batch_projection_fills_unknown_with_zero() {
        let db = db().await;
        let ledger = db.ledger();
        ledger
            .append(&[entry("pommes", 5, LedgerReason::OpeningBalance)])
            .await
            .unwrap();

        let ids = vec!["pommes".to_string(), "ghost".to_string()];
        let stock = ledger.current_stock_batch(&ids).await.unwrap();
        assert_eq!(stock.len(), 2);
        assert_eq!(stock["pommes"], 5);
        assert_eq!(stock["ghost"], 0);

        assert!(ledger.current_stock_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_newest_first() {
        let db = db().await;
        let ledger = db.ledger();
        for delta in [10, -1, -2] {
            ledger
                .append(&[entry("pommes", delta, LedgerReason::ManualAdjust)])
                .await
                .unwrap();
        }

        let history = ledger.entries_for_product("pommes", 2).await.unwrap();
        let deltas: Vec<_> = history.iter().map(|e| e.delta).collect();
        assert_eq!(deltas, vec![-2, -1]);
        assert_eq!(history[0].actor.as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn test_failed_batch_appends_nothing() {
        let db = db().await;
        let ledger = db.ledger();
        let first = entry("pommes", 5, LedgerReason::OpeningBalance);
        let duplicate = first.clone();

        assert!(ledger.append(&[first, duplicate]).await.is_err());
        assert_eq!(ledger.current_stock("pommes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_appends_sum_up() {
        let db = db().await;
        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = db.ledger();
            handles.push(tokio::spawn(async move {
                ledger
                    .append(&[entry("pommes", -1, LedgerReason::Sale)])
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(db.ledger().current_stock("pommes").await.unwrap(), -10);
    }
}
