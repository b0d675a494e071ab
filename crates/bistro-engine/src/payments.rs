//! # Payment Recorder
//!
//! Records the *result* of a payment (the gateway or the cash drawer did
//! the actual capture) and moves the order to `paid`.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  record_split_payment(order, [cash 500, twint 600], key)               │
//! │                                                                         │
//! │  validate amounts (cash/card/twint > 0, gratis ≥ 0)                     │
//! │  live "pos-payment" record for key? ──yes──► replay                    │
//! │  BEGIN                                                                  │
//! │    claim (pos-payment, key)  ──lost──► ROLLBACK, replay                 │
//! │    INSERT payment × 2                                                   │
//! │    UPDATE orders SET status='paid' WHERE id=? AND status='pending'      │
//! │        0 rows ──► ROLLBACK, InvalidTransition (claim undone)            │
//! │    store receipt under the claimed key                                  │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Whether the payments add up to the order total is the caller's policy;
//! the status is what says "paid".

use bistro_core::validation::{validate_idempotency_key, validate_payment_amount};
use bistro_core::{
    IdempotencyRecord, Order, OrderPayment, OrderStatus, PaymentMethod, ValidationError,
    PAYMENT_SCOPE,
};
use bistro_db::{IdempotencyRepository, OrderRepository, PaymentRepository};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

/// One tender of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInput {
    pub method: PaymentMethod,
    pub amount_cents: i64,
}

impl PaymentInput {
    pub fn new(method: PaymentMethod, amount_cents: i64) -> Self {
        PaymentInput {
            method,
            amount_cents,
        }
    }
}

/// The paid order and the payments this call recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub order: Order,
    pub payments: Vec<OrderPayment>,
}

/// A [`PaymentReceipt`] plus whether it was replayed from an earlier call.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub receipt: PaymentReceipt,
    pub replayed: bool,
}

fn replay(record: &IdempotencyRecord) -> EngineResult<PaymentOutcome> {
    let receipt: PaymentReceipt = serde_json::from_slice(&record.response)?;
    Ok(PaymentOutcome {
        receipt,
        replayed: true,
    })
}

impl Engine {
    /// Records a single payment and marks the order paid.
    pub async fn record_payment(
        &self,
        order_id: &str,
        payment: PaymentInput,
        idempotency_key: Option<&str>,
    ) -> EngineResult<PaymentOutcome> {
        self.record_split_payment(order_id, &[payment], idempotency_key)
            .await
    }

    /// Records several tenders at once and marks the order paid.
    ///
    /// ## Errors
    /// - `Validation` for an empty list or a bad amount (nothing written)
    /// - `NotFound` if the order doesn't exist
    /// - `InvalidTransition` if the order is not pending
    pub async fn record_split_payment(
        &self,
        order_id: &str,
        payments: &[PaymentInput],
        idempotency_key: Option<&str>,
    ) -> EngineResult<PaymentOutcome> {
        if payments.is_empty() {
            return Err(ValidationError::Required {
                field: "payments".to_string(),
            }
            .into());
        }
        for payment in payments {
            validate_payment_amount(payment.method, payment.amount_cents)?;
        }

        if let Some(key) = idempotency_key {
            validate_idempotency_key(key)?;
            if let Some(record) = self.db.idempotency().find(PAYMENT_SCOPE, key).await? {
                info!(order_id = %order_id, key = %key, "Replaying payment");
                return replay(&record);
            }
        }

        let mut tx = self.db.begin().await?;

        // Claimed before the order is read: a racing retry with the same key
        // blocks here and replays the committed receipt.
        if let Some(key) = idempotency_key {
            let (record, created) = IdempotencyRepository::claim(
                &mut tx,
                PAYMENT_SCOPE,
                key,
                &[],
                self.config.idempotency_ttl(),
            )
            .await?;

            if !created {
                tx.rollback().await?;
                info!(order_id = %order_id, key = %key, "Concurrent payment won, replaying");
                return replay(&record);
            }
        }

        let order = OrderRepository::find(&mut tx, order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        order.status.transition(OrderStatus::Paid)?;

        let paid_at = Utc::now();
        let device_id = self.config.device_id().map(str::to_string);
        let rows: Vec<OrderPayment> = payments
            .iter()
            .map(|payment| OrderPayment {
                id: Uuid::new_v4().to_string(),
                order_id: order_id.to_string(),
                method: payment.method,
                amount_cents: payment.amount_cents,
                device_id: device_id.clone(),
                paid_at,
            })
            .collect();

        for row in &rows {
            PaymentRepository::insert(&mut tx, row).await?;
        }

        let moved =
            OrderRepository::transition_status(&mut tx, order_id, OrderStatus::Pending, OrderStatus::Paid)
                .await?;
        if !moved {
            tx.rollback().await?;
            return Err(EngineError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Paid,
            });
        }

        let paid = OrderRepository::find(&mut tx, order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        let receipt = PaymentReceipt {
            order: paid,
            payments: rows,
        };

        if let Some(key) = idempotency_key {
            let payload = serde_json::to_vec(&receipt)?;
            IdempotencyRepository::store_response(&mut tx, PAYMENT_SCOPE, key, &payload).await?;
        }

        tx.commit().await?;

        let total: i64 = receipt.payments.iter().map(|p| p.amount_cents).sum();
        info!(
            order_id = %order_id,
            tenders = receipt.payments.len(),
            total_cents = total,
            order_total_cents = receipt.order.total_cents,
            "Order paid"
        );

        Ok(PaymentOutcome {
            receipt,
            replayed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::test_support::{engine, request, POMMES};
    use bistro_core::CartLine;

    async fn pending_order(engine: &Engine) -> String {
        engine
            .create_order(request(vec![CartLine::simple(POMMES, 2)], None))
            .await
            .unwrap()
            .receipt
            .order
            .id
    }

    #[tokio::test]
    async fn test_cash_payment_marks_paid() {
        let engine = engine().await;
        let order_id = pending_order(&engine).await;

        let outcome = engine
            .record_payment(&order_id, PaymentInput::new(PaymentMethod::Cash, 1100), None)
            .await
            .unwrap();

        assert!(!outcome.replayed);
        assert_eq!(outcome.receipt.order.status, OrderStatus::Paid);
        assert_eq!(outcome.receipt.payments[0].device_id.as_deref(), Some("till-1"));

        let details = engine.order_details(&order_id).await.unwrap();
        assert_eq!(details.order.status, OrderStatus::Paid);
        assert_eq!(details.total_paid_cents, 1100);
    }

    #[tokio::test]
    async fn test_split_tender() {
        let engine = engine().await;
        let order_id = pending_order(&engine).await;

        engine
            .record_split_payment(
                &order_id,
                &[
                    PaymentInput::new(PaymentMethod::Cash, 500),
                    PaymentInput::new(PaymentMethod::Twint, 600),
                ],
                None,
            )
            .await
            .unwrap();

        let details = engine.order_details(&order_id).await.unwrap();
        assert_eq!(details.payments.len(), 2);
        assert_eq!(details.total_paid_cents, 1100);
    }

    #[tokio::test]
    async fn test_second_payment_is_invalid_transition() {
        let engine = engine().await;
        let order_id = pending_order(&engine).await;
        let cash = PaymentInput::new(PaymentMethod::Cash, 1100);

        engine.record_payment(&order_id, cash, None).await.unwrap();
        let err = engine.record_payment(&order_id, cash, None).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition { from: OrderStatus::Paid, to: OrderStatus::Paid }
        ));

        // Rolled back: still exactly one payment
        let details = engine.order_details(&order_id).await.unwrap();
        assert_eq!(details.payments.len(), 1);
    }

    #[tokio::test]
    async fn test_idempotency_key_replays() {
        let engine = engine().await;
        let order_id = pending_order(&engine).await;
        let card = PaymentInput::new(PaymentMethod::Card, 1100);

        let first = engine.record_payment(&order_id, card, Some("pay-1")).await.unwrap();
        let second = engine.record_payment(&order_id, card, Some("pay-1")).await.unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.receipt, second.receipt);
        assert_eq!(engine.order_details(&order_id).await.unwrap().payments.len(), 1);
    }

    #[tokio::test]
    async fn test_racing_retries_replay_first_receipt() {
        let engine = engine().await;
        let order_id = pending_order(&engine).await;
        let card = PaymentInput::new(PaymentMethod::Card, 1100);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let engine = engine.clone();
            let order_id = order_id.clone();
            handles.push(tokio::spawn(async move {
                engine.record_payment(&order_id, card, Some("pay-race")).await
            }));
        }

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(outcomes.iter().filter(|o| !o.replayed).count(), 1);
        for outcome in &outcomes {
            assert_eq!(outcome.receipt, outcomes[0].receipt);
            assert_eq!(outcome.receipt.order.status, OrderStatus::Paid);
        }
        assert_eq!(engine.order_details(&order_id).await.unwrap().payments.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_payment_releases_key() {
        let engine = engine().await;
        let order_id = pending_order(&engine).await;
        engine.cancel_order(&order_id).await.unwrap();
        let cash = PaymentInput::new(PaymentMethod::Cash, 1100);

        assert!(engine.record_payment(&order_id, cash, Some("pay-x")).await.is_err());
        assert!(engine
            .db()
            .idempotency()
            .find(PAYMENT_SCOPE, "pay-x")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_amount_rules() {
        let engine = engine().await;
        let order_id = pending_order(&engine).await;

        let err = engine
            .record_payment(&order_id, PaymentInput::new(PaymentMethod::Cash, 0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        let err = engine
            .record_split_payment(&order_id, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        // Staff meal: zero is fine for gratis methods
        let outcome = engine
            .record_payment(&order_id, PaymentInput::new(PaymentMethod::GratisStaff, 0), None)
            .await
            .unwrap();
        assert_eq!(outcome.receipt.order.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn test_unknown_and_cancelled_orders() {
        let engine = engine().await;
        let cash = PaymentInput::new(PaymentMethod::Cash, 100);

        let err = engine.record_payment("ghost", cash, None).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));

        let order_id = pending_order(&engine).await;
        engine.cancel_order(&order_id).await.unwrap();
        let err = engine.record_payment(&order_id, cash, None).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition { from: OrderStatus::Cancelled, .. }
        ));
        assert!(engine.order_details(&order_id).await.unwrap().payments.is_empty());
    }
}
