//! # Inventory Service
//!
//! Ledger appends and the stock projector, plus the events they publish.
//!
//! ## Append Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  append_stock([+10 pommes, -2 pommes, +5 cola])                         │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │    INSERT × 3 into inventory_ledger                                     │
//! │    SELECT Σ delta for {cola, pommes}   (same transaction)               │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  publish {cola, delta +5, new 5}                                        │
//! │  publish {pommes, delta +8, new 58}     one event per product           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bistro_core::{
    InventoryLedgerEntry, LedgerProvenance, LedgerReason, StockChangeEvent, ValidationError,
};
use bistro_db::{LedgerRepository, SqliteConnection};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// Default page size for [`Engine::stock_history`].
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;

impl Engine {
    // =========================================================================
    // Appends
    // =========================================================================

    /// Appends a batch of entries in one transaction and publishes one
    /// event per product touched.
    pub async fn append_stock(
        &self,
        entries: &[InventoryLedgerEntry],
    ) -> EngineResult<Vec<StockChangeEvent>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.db.begin().await?;
        LedgerRepository::append_batch(&mut tx, entries).await?;
        let events = stock_events(&mut tx, entries).await?;
        tx.commit().await?;

        debug!(entries = entries.len(), products = events.len(), "Stock appended");
        self.hub.publish_all(&events).await;
        Ok(events)
    }

    /// Records the initial count of a product.
    pub async fn record_opening_balance(
        &self,
        product_id: &str,
        quantity: i64,
        actor: &str,
    ) -> EngineResult<StockChangeEvent> {
        if quantity < 0 {
            return Err(ValidationError::OutOfRange {
                field: "quantity".to_string(),
                min: 0,
                max: i64::MAX,
            }
            .into());
        }
        self.append_manual(product_id, quantity, LedgerReason::OpeningBalance, actor)
            .await
    }

    /// Staff count adjustment (breakage, delivery, recount).
    pub async fn adjust_stock(
        &self,
        product_id: &str,
        delta: i64,
        actor: &str,
    ) -> EngineResult<StockChangeEvent> {
        self.append_manual(product_id, delta, LedgerReason::ManualAdjust, actor)
            .await
    }

    /// System-side correction of a previous entry.
    pub async fn correct_stock(
        &self,
        product_id: &str,
        delta: i64,
        actor: &str,
    ) -> EngineResult<StockChangeEvent> {
        self.append_manual(product_id, delta, LedgerReason::Correction, actor)
            .await
    }

    async fn append_manual(
        &self,
        product_id: &str,
        delta: i64,
        reason: LedgerReason,
        actor: &str,
    ) -> EngineResult<StockChangeEvent> {
        if delta == 0 && reason != LedgerReason::OpeningBalance {
            return Err(ValidationError::MustBePositive {
                field: "delta".to_string(),
            }
            .into());
        }
        if actor.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "actor".to_string(),
            }
            .into());
        }
        if self.db.catalog().get_product(product_id).await?.is_none() {
            return Err(EngineError::not_found("Product", product_id));
        }

        let entry = InventoryLedgerEntry::new(
            product_id,
            delta,
            reason,
            self.with_device(LedgerProvenance::by_actor(actor)),
        );
        let event = self
            .append_stock(std::slice::from_ref(&entry))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::StorageFailure("no stock event for append".into()))?;

        info!(
            product_id = %product_id,
            delta,
            reason = ?reason,
            new_stock = event.new_stock,
            "Stock changed"
        );
        Ok(event)
    }

    // =========================================================================
    // Projection
    // =========================================================================

    /// Current stock of a product; 0 when it has no entries.
    pub async fn current_stock(&self, product_id: &str) -> EngineResult<i64> {
        Ok(self.db.ledger().current_stock(product_id).await?)
    }

    /// Current stock of many products; unknown ids map to 0.
    pub async fn current_stock_batch(
        &self,
        product_ids: &[String],
    ) -> EngineResult<HashMap<String, i64>> {
        Ok(self.db.ledger().current_stock_batch(product_ids).await?)
    }

    /// Ledger history of a product, newest first.
    pub async fn stock_history(
        &self,
        product_id: &str,
        limit: Option<u32>,
    ) -> EngineResult<Vec<InventoryLedgerEntry>> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
        Ok(self.db.ledger().entries_for_product(product_id, limit).await?)
    }
}

/// One event per product in `entries`, ordered by product id.
///
/// Must run on the connection that appended `entries` so `new_stock`
/// includes them.
pub(crate) async fn stock_events(
    conn: &mut SqliteConnection,
    entries: &[InventoryLedgerEntry],
) -> EngineResult<Vec<StockChangeEvent>> {
    let mut deltas: BTreeMap<String, i64> = BTreeMap::new();
    for entry in entries {
        *deltas.entry(entry.product_id.clone()).or_insert(0) += entry.delta;
    }
    if deltas.is_empty() {
        return Ok(Vec::new());
    }

    let product_ids: Vec<String> = deltas.keys().cloned().collect();
    let stock = LedgerRepository::stock_of_many(conn, &product_ids).await?;
    let timestamp = Utc::now();

    Ok(deltas
        .into_iter()
        .map(|(product_id, delta)| StockChangeEvent {
            new_stock: stock.get(&product_id).copied().unwrap_or_default(),
            product_id,
            delta,
            timestamp,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{engine, POMMES};
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_batch_publishes_one_event_per_product() {
        let engine = engine().await;
        let mut stream = engine.subscribe("dash").await;
        let actor = LedgerProvenance::by_actor("kitchen");

        let events = engine
            .append_stock(&[
                InventoryLedgerEntry::new(POMMES, 10, LedgerReason::ManualAdjust, actor.clone()),
                InventoryLedgerEntry::new(POMMES, -2, LedgerReason::ManualAdjust, actor.clone()),
                InventoryLedgerEntry::new("c", 5, LedgerReason::ManualAdjust, actor),
            ])
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].product_id, "c");
        assert_eq!(events[0].new_stock, 55);
        assert_eq!(events[1].product_id, POMMES);
        assert_eq!(events[1].delta, 8);
        assert_eq!(events[1].new_stock, 58);

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!((first.product_id.as_str(), second.product_id.as_str()), ("c", POMMES));
    }

    #[tokio::test]
    async fn test_manual_adjust_and_correction() {
        let engine = engine().await;

        let event = engine.adjust_stock(POMMES, -3, "kitchen").await.unwrap();
        assert_eq!(event.new_stock, 47);

        let event = engine.correct_stock(POMMES, 1, "system").await.unwrap();
        assert_eq!(event.new_stock, 48);
        assert_eq!(engine.current_stock(POMMES).await.unwrap(), 48);

        let history = engine.stock_history(POMMES, Some(2)).await.unwrap();
        assert_eq!(history[0].reason, LedgerReason::Correction);
        assert_eq!(history[1].reason, LedgerReason::ManualAdjust);
        assert_eq!(history[1].actor.as_deref(), Some("kitchen"));
        assert_eq!(history[1].device_id.as_deref(), Some("till-1"));
    }

    #[tokio::test]
    async fn test_opening_balance_for_new_product() {
        let engine = engine().await;
        // Menu products carry no stock but the ledger accepts any product id
        let event = engine
            .record_opening_balance("menu-burger", 0, "kitchen")
            .await
            .unwrap();
        assert_eq!(event.new_stock, 0);

        assert!(engine
            .record_opening_balance(POMMES, -1, "kitchen")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_manual_entries_are_validated() {
        let engine = engine().await;

        let err = engine.adjust_stock("ghost", 1, "kitchen").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));

        let err = engine.adjust_stock(POMMES, 0, "kitchen").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = engine.adjust_stock(POMMES, 1, " ").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        assert_eq!(engine.current_stock(POMMES).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_batch_projection() {
        let engine = engine().await;
        let stock = engine
            .current_stock_batch(&[POMMES.to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(stock[POMMES], 50);
        assert_eq!(stock["ghost"], 0);

        assert!(engine.append_stock(&[]).await.unwrap().is_empty());
    }
}
