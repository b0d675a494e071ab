//! # Engine Handle
//!
//! [`Engine`] owns the database, the stock hub and the configuration.
//! The use cases live in sibling modules as `impl Engine` blocks:
//!
//! | Module         | Operations                                           |
//! |----------------|------------------------------------------------------|
//! | `orders`       | create, cancel, refund, delete-if-pending, details   |
//! | `payments`     | record (split) payments                              |
//! | `redemption`   | hand over lines exactly once                         |
//! | `inventory`    | ledger appends and stock projection                  |

use bistro_core::LedgerProvenance;
use bistro_db::Database;
use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::hub::{StockHub, StockStream};

/// The order & inventory ledger engine.
///
/// Cheap to clone; clones share the pool and the hub.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) db: Database,
    pub(crate) hub: Arc<StockHub>,
    pub(crate) config: Arc<EngineConfig>,
}

impl Engine {
    /// Wraps an open database.
    pub fn new(db: Database, config: EngineConfig) -> Self {
        let hub = Arc::new(StockHub::new(config.hub.buffer));
        Engine {
            db,
            hub,
            config: Arc::new(config),
        }
    }

    /// Validates `config`, opens the database and runs migrations.
    pub async fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.to_db_config()).await?;

        info!(
            path = %config.database.path.display(),
            policy = %config.stock_policy(),
            "Engine ready"
        );
        Ok(Self::new(db, config))
    }

    /// Private in-memory engine.
    pub async fn in_memory() -> EngineResult<Self> {
        Self::open(EngineConfig::in_memory()).await
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn hub(&self) -> &Arc<StockHub> {
        &self.hub
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribes to stock changes. See [`StockHub::subscribe`].
    pub async fn subscribe(&self, subscriber_id: impl Into<String>) -> StockStream {
        self.hub.subscribe(subscriber_id).await
    }

    /// Ends a stock subscription.
    pub async fn unsubscribe(&self, subscriber_id: &str) -> bool {
        self.hub.unsubscribe(subscriber_id).await
    }

    /// Deletes expired idempotency records.
    pub async fn purge_expired_idempotency(&self) -> EngineResult<u64> {
        Ok(self.db.idempotency().purge_expired().await?)
    }

    /// Provenance for entries written on behalf of an order line.
    pub(crate) fn line_provenance(&self, order_id: &str, order_line_id: &str) -> LedgerProvenance {
        self.with_device(LedgerProvenance::for_order_line(order_id, order_line_id))
    }

    /// Stamps this engine's device id, if configured.
    pub(crate) fn with_device(&self, provenance: LedgerProvenance) -> LedgerProvenance {
        match self.config.device_id() {
            Some(device_id) => provenance.with_device(device_id),
            None => provenance,
        }
    }
}

// =============================================================================
// Test Fixtures
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    //! A small food-service catalog shared by the engine tests.

    use bistro_core::{
        CartLine, InventoryLedgerEntry, LedgerProvenance, LedgerReason, MenuSlot, OrderOrigin,
        OrderRequest, Product, ProductKind,
    };
    use chrono::Utc;

    use super::Engine;
    use crate::config::{EngineConfig, StockPolicy};

    pub const POMMES: &str = "pommes";
    pub const MENU: &str = "menu-burger";

    fn product(id: &str, kind: ProductKind, price_cents: i64) -> Product {
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

    /// Engine with Pommes (5.50), Burger {a, b}, Drink {c, d} and a
    /// 15.00 menu. Every simple product starts at `opening` stock.
    pub async fn engine_with(policy: StockPolicy, opening: i64) -> Engine {
        let mut config = EngineConfig::in_memory();
        config.stock.policy = policy;
        config.device.id = Some("till-1".to_string());
        let engine = Engine::open(config).await.unwrap();

        let catalog = engine.db().catalog();
        let simple = [(POMMES, 550), ("a", 1200), ("b", 1250), ("c", 400), ("d", 350)];
        for (id, price) in simple {
            catalog
                .insert_product(&product(id, ProductKind::Simple, price))
                .await
                .unwrap();
        }
        catalog
            .insert_product(&product(MENU, ProductKind::Menu, 1500))
            .await
            .unwrap();
        for (id, name, sequence, options) in [
            ("slot-burger", "Burger", 1, ["a", "b"]),
            ("slot-drink", "Drink", 2, ["c", "d"]),
        ] {
            catalog
                .insert_menu_slot(&MenuSlot {
                    id: id.to_string(),
                    menu_product_id: MENU.to_string(),
                    name: name.to_string(),
                    sequence,
                    option_product_ids: options.iter().map(|o| o.to_string()).collect(),
                })
                .await
                .unwrap();
        }

        let entries: Vec<_> = simple
            .iter()
            .map(|(id, _)| {
                InventoryLedgerEntry::new(
                    *id,
                    opening,
                    LedgerReason::OpeningBalance,
                    LedgerProvenance::by_actor("test"),
                )
            })
            .collect();
        engine.db().ledger().append(&entries).await.unwrap();

        engine
    }

    pub async fn engine() -> Engine {
        engine_with(StockPolicy::AllowOversell, 50).await
    }

    pub fn request(lines: Vec<CartLine>, attempt_id: Option<&str>) -> OrderRequest {
        OrderRequest {
            customer_id: None,
            contact_email: Some("guest@example.com".to_string()),
            origin: OrderOrigin::Storefront,
            payment_attempt_id: attempt_id.map(str::to_string),
            lines,
        }
    }
}
