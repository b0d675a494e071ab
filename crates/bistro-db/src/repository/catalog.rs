//! # Catalog Repository
//!
//! Products and menu slots. The engine only reads the catalog; the insert
//! helpers exist for seeding and tests.
//!
//! ## Menu Layout
//! ```text
//! products ◄── menu_slots (menu_product_id, sequence)
//!                    │
//!                    └──► menu_slot_options (slot_id, product_id) ──► products
//! ```

use bistro_core::{CatalogSnapshot, MenuSlot, Product, ProductKind};
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};

const PRODUCT_COLUMNS: &str = "id, name, kind, price_cents, is_active, created_at, updated_at";

/// Repository for catalog reads.
#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    /// Creates a new CatalogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    /// Gets a product by ID.
    pub async fn get_product(&self, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Gets every product whose id is in `ids`. Unknown ids are skipped.
    pub async fn get_products(&self, ids: &[String]) -> DbResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id IN ("
        ));
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let products = query
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;

        Ok(products)
    }

    /// Gets the slots of a menu, ordered by sequence, options filled in.
    pub async fn get_menu_slots(&self, menu_id: &str) -> DbResult<Vec<MenuSlot>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.menu_product_id, s.name, s.sequence, o.product_id
            FROM menu_slots s
            LEFT JOIN menu_slot_options o ON o.slot_id = s.id
            WHERE s.menu_product_id = ?1
            ORDER BY s.sequence, s.id, o.product_id
            "#,
        )
        .bind(menu_id)
        .fetch_all(&self.pool)
        .await?;

        let mut slots: Vec<MenuSlot> = Vec::new();
        for row in rows {
            let slot_id: String = row.try_get("id")?;
            let option: Option<String> = row.try_get("product_id")?;

            match slots.last_mut() {
                Some(slot) if slot.id == slot_id => {
                    slot.option_product_ids.extend(option);
                }
                _ => slots.push(MenuSlot {
                    id: slot_id,
                    menu_product_id: row.try_get("menu_product_id")?,
                    name: row.try_get("name")?,
                    sequence: row.try_get("sequence")?,
                    option_product_ids: option.into_iter().collect(),
                }),
            }
        }

        Ok(slots)
    }

    /// Loads the products a request touches, plus the slots of any menus
    /// among them.
    pub async fn snapshot(&self, product_ids: &[String]) -> DbResult<CatalogSnapshot> {
        let products = self.get_products(product_ids).await?;

        let mut snapshot = CatalogSnapshot::new();
        for product in products {
            if product.kind == ProductKind::Menu {
                let slots = self.get_menu_slots(&product.id).await?;
                snapshot.insert_menu_slots(product.id.clone(), slots);
            }
            snapshot.insert_product(product);
        }

        debug!(
            requested = product_ids.len(),
            found = snapshot.len(),
            "Loaded catalog snapshot"
        );
        Ok(snapshot)
    }

    /// Counts products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Inserts a product.
    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (id, name, kind, price_cents, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&product.id)
        .bind(&product.name)
        .bind(product.kind)
        .bind(product.price_cents)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts a menu slot with its eligible options in one transaction.
    pub async fn insert_menu_slot(&self, slot: &MenuSlot) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::insert_menu_slot_with(&mut tx, slot).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_menu_slot_with(conn: &mut SqliteConnection, slot: &MenuSlot) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO menu_slots (id, menu_product_id, name, sequence) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&slot.id)
        .bind(&slot.menu_product_id)
        .bind(&slot.name)
        .bind(slot.sequence)
        .execute(&mut *conn)
        .await?;

        for option in &slot.option_product_ids {
            sqlx::query("INSERT INTO menu_slot_options (slot_id, product_id) VALUES (?1, ?2)")
                .bind(&slot.id)
                .bind(option)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    /// Activates or deactivates a product.
    pub async fn set_active(&self, id: &str, is_active: bool) -> DbResult<()> {
        let result = sqlx::query("UPDATE products SET is_active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(is_active)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
