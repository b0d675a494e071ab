//! # Redemption Tracker
//!
//! Pickup screens mark lines as handed over. Each line is handed over at
//! most once, however many screens tap it.

use bistro_core::OrderStatus;
use bistro_db::{OrderRepository, RedemptionRepository};
use tracing::info;

use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

impl Engine {
    /// Redeems the given lines.
    ///
    /// ## Returns
    /// Number of lines newly redeemed; 0 when they all already were.
    ///
    /// ## Errors
    /// `NotFound` if any id is not an order line. Nothing is written then.
    pub async fn redeem_lines(&self, line_ids: &[String]) -> EngineResult<u64> {
        Ok(self
            .db
            .redemptions()
            .redeem_unredeemed_by_order_line_ids(line_ids)
            .await?)
    }

    /// Redeems every line of a paid order.
    ///
    /// ## Errors
    /// - `NotFound` if the order doesn't exist
    /// - `NotRedeemable` if it is not `paid`
    pub async fn redeem_order(&self, order_id: &str) -> EngineResult<u64> {
        let mut tx = self.db.begin().await?;

        let order = OrderRepository::find(&mut tx, order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))?;
        if order.status != OrderStatus::Paid {
            return Err(EngineError::NotRedeemable {
                order_id: order_id.to_string(),
                status: order.status,
            });
        }

        let line_ids: Vec<String> = OrderRepository::lines_of(&mut tx, order_id)
            .await?
            .into_iter()
            .map(|line| line.id)
            .collect();
        let redeemed = RedemptionRepository::redeem_with(&mut tx, &line_ids).await?;
        tx.commit().await?;

        info!(order_id = %order_id, redeemed, "Order handed over");
        Ok(redeemed)
    }

    /// Ids of the lines of an order that were already handed over.
    pub async fn redeemed_line_ids(&self, order_id: &str) -> EngineResult<Vec<String>> {
        Ok(self.db.redemptions().redeemed_line_ids(order_id).await?)
    }
}
