//! # Seed Data Generator
//!
//! Populates the database with a small food-service catalog for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./bistro_dev.db with opening stock of 50 per product
//! cargo run -p bistro-db --bin seed
//!
//! # Custom database and opening stock
//! cargo run -p bistro-db --bin seed -- --db ./data/ledger.db --stock 120
//! ```
//!
//! ## Generated Catalog
//! - Simple products: Pommes, burgers, drinks
//! - One "Burger Menu" with a Burger slot and a Drink slot
//! - An `opening_balance` ledger entry per simple product

use bistro_core::{
    InventoryLedgerEntry, LedgerProvenance, LedgerReason, MenuSlot, Product, ProductKind,
};
use bistro_db::{Database, DbConfig};
use chrono::Utc;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// (id, name, price in cents)
const SIMPLE_PRODUCTS: &[(&str, &str, i64)] = &[
    ("pommes", "Pommes", 550),
    ("burger-classic", "Classic Burger", 1250),
    ("burger-veggie", "Veggie Burger", 1250),
    ("cola", "Cola 0.5l", 450),
    ("water", "Mineral Water 0.5l", 350),
];

const MENU_ID: &str = "menu-burger";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut db_path = "./bistro_dev.db".to_string();
    let mut opening_stock: i64 = 50;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--stock" | "-s" => {
                if i + 1 < args.len() {
                    opening_stock = args[i + 1].parse().unwrap_or(50);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Bistro Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./bistro_dev.db)");
                println!("  -s, --stock <N>    Opening stock per product (default: 50)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, opening_stock, "Seeding catalog");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let existing = db.catalog().count().await?;
    if existing > 0 {
        warn!(existing, "Database already has products, skipping seed");
        return Ok(());
    }

    let now = Utc::now();
    let catalog = db.catalog();

    for (id, name, price_cents) in SIMPLE_PRODUCTS {
        catalog
            .insert_product(&Product {
                id: id.to_string(),
                name: name.to_string(),
                kind: ProductKind::Simple,
                price_cents: *price_cents,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await?;
    }

    catalog
        .insert_product(&Product {
            id: MENU_ID.to_string(),
            name: "Burger Menu".to_string(),
            kind: ProductKind::Menu,
            price_cents: 1500,
            is_active: true,
            created_at: now,
            updated_at: now,
        })
        .await?;

    for (sequence, (slot_id, slot_name, options)) in [
        ("slot-burger", "Burger", vec!["burger-classic", "burger-veggie"]),
        ("slot-drink", "Drink", vec!["cola", "water"]),
    ]
    .into_iter()
    .enumerate()
    {
        catalog
            .insert_menu_slot(&MenuSlot {
                id: slot_id.to_string(),
                menu_product_id: MENU_ID.to_string(),
                name: slot_name.to_string(),
                sequence: sequence as i64 + 1,
                option_product_ids: options.into_iter().map(str::to_string).collect(),
            })
            .await?;
    }

    let entries: Vec<InventoryLedgerEntry> = SIMPLE_PRODUCTS
        .iter()
        .map(|(id, _, _)| {
            InventoryLedgerEntry::new(
                *id,
                opening_stock,
                LedgerReason::OpeningBalance,
                LedgerProvenance::by_actor("seed"),
            )
        })
        .collect();
    db.ledger().append(&entries).await?;

    info!(
        products = SIMPLE_PRODUCTS.len() + 1,
        ledger_entries = entries.len(),
        "Seed complete"
    );

    Ok(())
}
