//! # Redemption Repository
//!
//! A row in `order_line_redemptions` means the line was handed over.
//!
//! ## Exactly Once
//! ```text
//! pickup screen A ──┐                       UNIQUE(order_line_id)
//!                   ├── INSERT OR IGNORE ──►  first insert wins
//! pickup screen B ──┘                         second is ignored (0 rows)
//! ```

use bistro_core::OrderLineRedemption;
use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};

/// Repository for line redemptions.
#[derive(Debug, Clone)]
pub struct RedemptionRepository {
    pool: SqlitePool,
}

impl RedemptionRepository {
    /// Creates a new RedemptionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RedemptionRepository { pool }
    }

    /// Marks every given line redeemed unless it already is.
    ///
    /// ## Returns
    /// Number of lines newly redeemed. A repeated call returns 0.
    ///
    /// ## Errors
    /// `NotFound` if any id is not an order line; nothing is written then.
    pub async fn redeem_unredeemed_by_order_line_ids(&self, line_ids: &[String]) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;
        let redeemed = Self::redeem_with(&mut tx, line_ids).await?;
        tx.commit().await?;
        Ok(redeemed)
    }

    /// Transaction-scoped form of [`Self::redeem_unredeemed_by_order_line_ids`].
    pub async fn redeem_with(conn: &mut SqliteConnection, line_ids: &[String]) -> DbResult<u64> {
        let unique: BTreeSet<&str> = line_ids.iter().map(String::as_str).collect();
        if unique.is_empty() {
            return Ok(0);
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT id FROM order_lines WHERE id IN (");
        let mut separated = query.separated(", ");
        for id in &unique {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
        let known: BTreeSet<String> = query
            .build_query_scalar::<String>()
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .collect();

        if let Some(missing) = unique.iter().find(|id| !known.contains(**id)) {
            return Err(DbError::not_found("Order line", *missing));
        }

        let now = Utc::now();
        let mut redeemed = 0;
        for id in &unique {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO order_line_redemptions (id, order_line_id, redeemed_at) \
                 VALUES (?1, ?2, ?3)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(*id)
            .bind(now)
            .execute(&mut *conn)
            .await?;
            redeemed += result.rows_affected();
        }

        debug!(requested = unique.len(), redeemed, "Redeemed order lines");
        if redeemed > 0 {
            info!(redeemed, "Order lines handed over");
        }
        Ok(redeemed)
    }

    /// Ids of the redeemed lines of an order.
    pub async fn redeemed_line_ids(&self, order_id: &str) -> DbResult<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            r#"
            SELECT r.order_line_id
            FROM order_line_redemptions r
            JOIN order_lines l ON l.id = r.order_line_id
            WHERE l.order_id = ?1
            ORDER BY l.rowid
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Gets the redemption of a line, if any.
    pub async fn get(&self, order_line_id: &str) -> DbResult<Option<OrderLineRedemption>> {
        let redemption = sqlx::query_as::<_, OrderLineRedemption>(
            "SELECT id, order_line_id, redeemed_at FROM order_line_redemptions \
             WHERE order_line_id = ?1",
        )
        .bind(order_line_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(redemption)
    }
}
