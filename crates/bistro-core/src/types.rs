//! # Domain Types
//!
//! Core domain types used throughout Bistro Ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │   OrderLine     │   │  OrderPayment   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │◄──│  order_id (FK)  │   │  order_id (FK)  │       │
//! │  │  status         │   │  line_type      │   │  method         │       │
//! │  │  total_cents    │   │  parent_line_id │   │  amount_cents   │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │                                       │
//! │                        ┌────────▼────────────┐                          │
//! │                        │ OrderLineRedemption │ (row exists = fulfilled) │
//! │                        └─────────────────────┘                          │
//! │                                                                         │
//! │  ┌──────────────────────┐   ┌───────────────────┐                      │
//! │  │ InventoryLedgerEntry │   │ IdempotencyRecord │                      │
//! │  │  product_id, delta   │   │  (scope, key)     │                      │
//! │  │  reason, provenance  │   │  response, expiry │                      │
//! │  └──────────────────────┘   └───────────────────┘                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Order lines freeze the product title and unit price at time of sale.
//! A later catalog rename or price change never rewrites history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;

// =============================================================================
// Catalog
// =============================================================================

/// Whether a product is sold on its own or as a slot-based bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind {
    /// Sold as-is (e.g. "Pommes").
    Simple,
    /// A menu composed of slots, each filled by one option product.
    Menu,
}

/// A product in the catalog. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub kind: ProductKind,
    /// Price in cents. For menus this is the bundle price.
    pub price_cents: i64,
    /// Inactive products cannot be ordered.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn is_menu(&self) -> bool {
        self.kind == ProductKind::Menu
    }
}

/// A named, sequenced choice point within a menu (e.g. "Drink").
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MenuSlot {
    pub id: String,
    pub menu_product_id: String,
    pub name: String,
    /// Display and expansion order within the menu.
    pub sequence: i64,
    /// Products a customer may choose for this slot.
    pub option_product_ids: Vec<String>,
}

impl MenuSlot {
    /// Checks whether a product may fill this slot.
    pub fn is_eligible(&self, product_id: &str) -> bool {
        self.option_product_ids.iter().any(|id| id == product_id)
    }
}

// =============================================================================
// Order Status / Origin
// =============================================================================

/// The status of an order. Transitions are enforced in [`crate::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, waiting for payment.
    Pending,
    /// Payment recorded.
    Paid,
    /// Abandoned before payment.
    Cancelled,
    /// Paid, then money returned.
    Refunded,
}

impl OrderStatus {
    /// Lowercase name, identical to the stored value.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an order was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderOrigin {
    /// Customer pre-order through the web shop.
    Storefront,
    /// Cashier at the till.
    Pos,
}

// =============================================================================
// Order
// =============================================================================

/// A customer order.
///
/// ## Invariant
/// `total_cents` equals Σ `quantity × unit_price_cents` over the order's
/// `simple` and `bundle` lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Order {
    pub id: String,
    pub customer_id: Option<String>,
    pub contact_email: Option<String>,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub origin: OrderOrigin,
    /// Caller-supplied checkout attempt id (idempotency correlation).
    pub payment_attempt_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the order total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Order Line
// =============================================================================

/// Kind of order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    /// A simple product.
    Simple,
    /// A menu; carries the sellable price.
    Bundle,
    /// One slot choice of a bundle; priced at zero.
    Component,
}

impl LineType {
    /// Simple and bundle lines make up the order total.
    #[inline]
    pub const fn contributes_to_total(&self) -> bool {
        matches!(self, LineType::Simple | LineType::Bundle)
    }

    /// Simple and component lines move physical stock.
    #[inline]
    pub const fn affects_stock(&self) -> bool {
        matches!(self, LineType::Simple | LineType::Component)
    }
}

/// A line in an order.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    pub line_type: LineType,
    pub product_id: String,
    /// Product name at time of sale (frozen).
    pub title: String,
    pub quantity: i64,
    /// Unit price in cents at time of sale (frozen).
    pub unit_price_cents: i64,
    /// Owning bundle line (component lines only).
    pub parent_line_id: Option<String>,
    /// Slot this component fills.
    pub menu_slot_id: Option<String>,
    /// Slot name at time of sale (frozen).
    pub slot_name: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl OrderLine {
    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// Returns unit price × quantity.
    #[inline]
    pub fn subtotal(&self) -> Money {
        self.unit_price().multiply_quantity(self.quantity)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// How an order was settled.
///
/// The `gratis-*` methods record complimentary orders; they carry an
/// amount (usually zero) for reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "kebab-case"))]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Twint,
    GratisGuest,
    GratisVip,
    GratisStaff,
    GratisLoyalty,
}

impl PaymentMethod {
    /// True for complimentary methods.
    pub const fn is_gratis(&self) -> bool {
        matches!(
            self,
            PaymentMethod::GratisGuest
                | PaymentMethod::GratisVip
                | PaymentMethod::GratisStaff
                | PaymentMethod::GratisLoyalty
        )
    }
}

/// A payment towards an order.
/// An order can have multiple payments for split tender scenarios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderPayment {
    pub id: String,
    pub order_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    /// Till or terminal that took the payment.
    pub device_id: Option<String>,
    #[ts(as = "String")]
    pub paid_at: DateTime<Utc>,
}

impl OrderPayment {
    /// Returns the payment amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Redemption
// =============================================================================

/// Marks an order line as handed over. At most one per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct OrderLineRedemption {
    pub id: String,
    pub order_line_id: String,
    #[ts(as = "String")]
    pub redeemed_at: DateTime<Utc>,
}

// =============================================================================
// Inventory Ledger
// =============================================================================

/// Why stock changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    /// Initial count, usually positive.
    OpeningBalance,
    /// Goods sold, negative.
    Sale,
    /// Goods returned with a refund.
    Refund,
    /// Manual count adjustment by staff.
    ManualAdjust,
    /// System compensation (cancelled or reaped orders).
    Correction,
}

/// Who or what caused a ledger entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerProvenance {
    pub order_id: Option<String>,
    pub order_line_id: Option<String>,
    pub device_id: Option<String>,
    pub actor: Option<String>,
}

impl LedgerProvenance {
    /// Provenance for an entry caused by an order line.
    pub fn for_order_line(order_id: impl Into<String>, order_line_id: impl Into<String>) -> Self {
        LedgerProvenance {
            order_id: Some(order_id.into()),
            order_line_id: Some(order_line_id.into()),
            ..Default::default()
        }
    }

    /// Provenance for an entry made by a person.
    pub fn by_actor(actor: impl Into<String>) -> Self {
        LedgerProvenance {
            actor: Some(actor.into()),
            ..Default::default()
        }
    }

    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// One immutable, signed stock change. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InventoryLedgerEntry {
    pub id: String,
    pub product_id: String,
    pub delta: i64,
    pub reason: LedgerReason,
    pub order_id: Option<String>,
    pub order_line_id: Option<String>,
    pub device_id: Option<String>,
    pub actor: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl InventoryLedgerEntry {
    /// Creates a new entry with a fresh id, stamped now.
    pub fn new(
        product_id: impl Into<String>,
        delta: i64,
        reason: LedgerReason,
        provenance: LedgerProvenance,
    ) -> Self {
        InventoryLedgerEntry {
            id: Uuid::new_v4().to_string(),
            product_id: product_id.into(),
            delta,
            reason,
            order_id: provenance.order_id,
            order_line_id: provenance.order_line_id,
            device_id: provenance.device_id,
            actor: provenance.actor,
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Idempotency
// =============================================================================

/// Stored outcome of a creation request, keyed by (scope, key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct IdempotencyRecord {
    pub scope: String,
    pub key: String,
    /// Opaque payload replayed verbatim on retries.
    pub response: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Expired records are ignored by lookups.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// =============================================================================
// Stock Events
// =============================================================================

/// Broadcast after a ledger batch commits, one per product touched.
///
/// ## Wire Shape
/// ```json
/// { "productId": "…", "newStock": 48, "delta": -2, "timestamp": "2026-01-31T12:00:00Z" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockChangeEvent {
    pub product_id: String,
    pub new_stock: i64,
    /// Net change of this batch for the product.
    pub delta: i64,
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
