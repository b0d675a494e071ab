//! # Order Use Cases
//!
//! Idempotent order creation and the status changes that give stock back.
//!
//! ## Create Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_order(request)                                                  │
//! │                                                                         │
//! │  1. live "order-create" record for the attempt id? ──yes──► replay     │
//! │  2. catalog snapshot ──► OrderBuilder::build ──► OrderDraft            │
//! │  3. BEGIN                                                               │
//! │       claim (order-create, attempt id)  ──lost──► ROLLBACK, replay     │
//! │       stock policy check (reject_insufficient only)                     │
//! │       INSERT order, lines                                               │
//! │       INSERT one `sale` entry per simple/component line                 │
//! │     COMMIT                                                              │
//! │  4. publish one StockChangeEvent per product                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Giving Stock Back
//! | Operation                              | Status change        | Reason       |
//! |----------------------------------------|----------------------|--------------|
//! | `cancel_order`                         | pending → cancelled  | `correction` |
//! | `refund_order`                         | paid → refunded      | `refund`     |
//! | `delete_if_pending`                    | row deleted          | `correction` |
//! | `delete_pending_by_attempt_id_except`  | rows deleted         | `correction` |
//!
//! The compensating entries are written in the same transaction as the
//! status change, so stock and status can't disagree.

use bistro_core::validation::validate_idempotency_key;
use bistro_core::{
    CoreError, IdempotencyRecord, InventoryLedgerEntry, LedgerReason, Order, OrderBuilder,
    OrderLine, OrderPayment, OrderRequest, OrderStatus, ORDER_CREATE_SCOPE,
};
use bistro_db::{IdempotencyRepository, LedgerRepository, OrderRepository, SqliteConnection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::StockPolicy;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::inventory::stock_events;

// =============================================================================
// Results
// =============================================================================

/// What order creation answers. Also the stored idempotency payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

/// An [`OrderReceipt`] plus whether it was replayed from an earlier call.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderOutcome {
    pub receipt: OrderReceipt,
    pub replayed: bool,
}

/// Everything a receipt printer or pickup screen needs about one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub payments: Vec<OrderPayment>,
    pub redeemed_line_ids: Vec<String>,
    /// Σ payments. Informational; the status decides whether it's paid.
    pub total_paid_cents: i64,
}

fn replay(record: &IdempotencyRecord) -> EngineResult<OrderOutcome> {
    let receipt: OrderReceipt = serde_json::from_slice(&record.response)?;
    Ok(OrderOutcome {
        receipt,
        replayed: true,
    })
}

impl Engine {
    // =========================================================================
    // Creation
    // =========================================================================

    /// Creates an order from a cart.
    ///
    /// With a `payment_attempt_id`, retries of the same attempt replay the
    /// first receipt and write nothing.
    ///
    /// ## Errors
    /// - `Validation`, `NotFound`, `InvalidSelection` for a bad cart
    /// - `InsufficientStock` under [`StockPolicy::RejectInsufficient`]
    /// - `StorageFailure` if the transaction failed (rolled back)
    pub async fn create_order(&self, request: OrderRequest) -> EngineResult<OrderOutcome> {
        let attempt_id = request.payment_attempt_id.clone();

        if let Some(key) = attempt_id.as_deref() {
            validate_idempotency_key(key)?;
            if let Some(record) = self.db.idempotency().find(ORDER_CREATE_SCOPE, key).await? {
                info!(attempt_id = %key, "Replaying order creation");
                return replay(&record);
            }
        }

        let catalog = self
            .db
            .catalog()
            .snapshot(&request.referenced_product_ids())
            .await?;
        let draft = OrderBuilder::new(&catalog).build(&request)?;
        let receipt = OrderReceipt {
            order: draft.order.clone(),
            lines: draft.lines.clone(),
        };

        let mut tx = self.db.begin().await?;

        if let Some(key) = attempt_id.as_deref() {
            let payload = serde_json::to_vec(&receipt)?;
            let (record, created) = IdempotencyRepository::claim(
                &mut tx,
                ORDER_CREATE_SCOPE,
                key,
                &payload,
                self.config.idempotency_ttl(),
            )
            .await?;

            if !created {
                tx.rollback().await?;
                info!(attempt_id = %key, "Concurrent attempt won, replaying");
                return replay(&record);
            }
        }

        if self.config.stock_policy() == StockPolicy::RejectInsufficient {
            let required = draft.stock_requirements();
            let product_ids: Vec<String> = required.keys().cloned().collect();
            let stock = LedgerRepository::stock_of_many(&mut tx, &product_ids).await?;

            for (product_id, requested) in required {
                let available = stock.get(&product_id).copied().unwrap_or_default();
                if available < requested {
                    warn!(
                        product_id = %product_id,
                        requested,
                        available,
                        "Order rejected: insufficient stock"
                    );
                    // Dropping the transaction rolls back the claim
                    return Err(EngineError::InsufficientStock {
                        product_id,
                        requested,
                        available,
                    });
                }
            }
        }

        OrderRepository::insert_order(&mut tx, &draft.order).await?;
        OrderRepository::insert_lines(&mut tx, &draft.lines).await?;

        let entries: Vec<InventoryLedgerEntry> = draft
            .stock_movements()
            .into_iter()
            .map(|movement| {
                InventoryLedgerEntry::new(
                    movement.product_id,
                    movement.delta,
                    LedgerReason::Sale,
                    self.line_provenance(&draft.order.id, &movement.order_line_id),
                )
            })
            .collect();
        LedgerRepository::append_batch(&mut tx, &entries).await?;
        let events = stock_events(&mut tx, &entries).await?;

        tx.commit().await?;

        info!(
            order_id = %receipt.order.id,
            total_cents = receipt.order.total_cents,
            lines = receipt.lines.len(),
            origin = ?receipt.order.origin,
            "Order created"
        );
        self.hub.publish_all(&events).await;

        Ok(OrderOutcome {
            receipt,
            replayed: false,
        })
    }

    // =========================================================================
    // Status Changes
    // =========================================================================

    /// pending → cancelled, giving the stock back as `correction` entries.
    pub async fn cancel_order(&self, order_id: &str) -> EngineResult<Order> {
        self.reverse_order(order_id, OrderStatus::Cancelled, LedgerReason::Correction)
            .await
    }

    /// paid → refunded, giving the stock back as `refund` entries.
    pub async fn refund_order(&self, order_id: &str) -> EngineResult<Order> {
        self.reverse_order(order_id, OrderStatus::Refunded, LedgerReason::Refund)
            .await
    }

    async fn reverse_order(
        &self,
        order_id: &str,
        to: OrderStatus,
        reason: LedgerReason,
    ) -> EngineResult<Order> {
        let mut tx = self.db.begin().await?;

        let order = OrderRepository::find(&mut tx, order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        let from = order.status;
        from.transition(to)?;

        if !OrderRepository::transition_status(&mut tx, order_id, from, to).await? {
            tx.rollback().await?;
            return Err(CoreError::InvalidTransition { from, to }.into());
        }

        let lines = OrderRepository::lines_of(&mut tx, order_id).await?;
        let entries = self.restock_entries(order_id, &lines, reason);
        LedgerRepository::append_batch(&mut tx, &entries).await?;
        let events = stock_events(&mut tx, &entries).await?;

        let updated = OrderRepository::find(&mut tx, order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        tx.commit().await?;

        info!(order_id = %order_id, %from, %to, restocked = entries.len(), "Order reversed");
        self.hub.publish_all(&events).await;
        Ok(updated)
    }

    // =========================================================================
    // Cleanup
    // =========================================================================

    /// Deletes an order that is still pending and gives its stock back.
    ///
    /// ## Returns
    /// `false` (and nothing written) if the order is gone, already moved on,
    /// or has a line that was handed over.
    pub async fn delete_if_pending(&self, order_id: &str) -> EngineResult<bool> {
        let mut tx = self.db.begin().await?;

        let Some(entries) = self.delete_pending_with(&mut tx, order_id).await? else {
            tx.rollback().await?;
            return Ok(false);
        };
        let events = stock_events(&mut tx, &entries).await?;
        tx.commit().await?;

        info!(order_id = %order_id, "Pending order deleted");
        self.hub.publish_all(&events).await;
        Ok(true)
    }

    /// Deletes every pending order of `attempt_id` except `keep_id`.
    ///
    /// Reaps duplicates left behind by a checkout that was submitted again
    /// after its idempotency record expired.
    ///
    /// ## Returns
    /// Number of orders deleted.
    pub async fn delete_pending_by_attempt_id_except(
        &self,
        attempt_id: &str,
        keep_id: &str,
    ) -> EngineResult<u64> {
        let mut tx = self.db.begin().await?;

        let ids = OrderRepository::pending_ids_by_attempt_except(&mut tx, attempt_id, keep_id)
            .await?;

        let mut deleted = 0;
        let mut entries = Vec::new();
        for id in &ids {
            if let Some(restocked) = self.delete_pending_with(&mut tx, id).await? {
                deleted += 1;
                entries.extend(restocked);
            }
        }

        if deleted == 0 {
            tx.rollback().await?;
            return Ok(0);
        }

        let events = stock_events(&mut tx, &entries).await?;
        tx.commit().await?;

        info!(attempt_id = %attempt_id, keep_id = %keep_id, deleted, "Duplicate pending orders reaped");
        self.hub.publish_all(&events).await;
        Ok(deleted)
    }

    /// Deletes one pending order on `conn` and appends its restock entries.
    ///
    /// `None` if nothing was deleted.
    async fn delete_pending_with(
        &self,
        conn: &mut SqliteConnection,
        order_id: &str,
    ) -> EngineResult<Option<Vec<InventoryLedgerEntry>>> {
        // Lines cascade with the order, read them first
        let lines = OrderRepository::lines_of(conn, order_id).await?;

        if !OrderRepository::delete_if_pending(conn, order_id).await? {
            debug!(order_id = %order_id, "Not pending or handed over, nothing deleted");
            return Ok(None);
        }

        let entries = self.restock_entries(order_id, &lines, LedgerReason::Correction);
        LedgerRepository::append_batch(conn, &entries).await?;
        Ok(Some(entries))
    }

    /// `+quantity` per stock-affecting line.
    fn restock_entries(
        &self,
        order_id: &str,
        lines: &[OrderLine],
        reason: LedgerReason,
    ) -> Vec<InventoryLedgerEntry> {
        bistro_core::builder::stock_movements(lines)
            .into_iter()
            .map(|movement| {
                InventoryLedgerEntry::new(
                    movement.product_id,
                    -movement.delta,
                    reason,
                    self.line_provenance(order_id, &movement.order_line_id),
                )
            })
            .collect()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Order, lines, payments and fulfilment state.
    pub async fn order_details(&self, order_id: &str) -> EngineResult<OrderDetails> {
        let orders = self.db.orders();
        let order = orders
            .get(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;

        let lines = orders.get_lines(order_id).await?;
        let payments = self.db.payments().list_for_order(order_id).await?;
        let redeemed_line_ids = self.db.redemptions().redeemed_line_ids(order_id).await?;
        let total_paid_cents = payments.iter().map(|p| p.amount_cents).sum();

        Ok(OrderDetails {
            order,
            lines,
            payments,
            redeemed_line_ids,
            total_paid_cents,
        })
    }

    /// Orders of a checkout attempt, oldest first.
    pub async fn orders_by_attempt_id(&self, attempt_id: &str) -> EngineResult<Vec<Order>> {
        Ok(self.db.orders().find_by_attempt_id(attempt_id).await?)
    }
}
