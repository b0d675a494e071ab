//! # bistro-core: Pure Business Logic for Bistro Ledger
//!
//! This crate is the **heart** of Bistro Ledger. It contains the order and
//! inventory rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Bistro Ledger Architecture                         │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Storefront / Till / Pickup screen (outside)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 bistro-engine (use cases)                       │   │
//! │  │   create_order, record_payment, redeem_order, adjust_stock     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ bistro-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  builder  │  │  status   │  │   │
//! │  │   │   Order   │  │   Money   │  │ cart →    │  │  pending  │  │   │
//! │  │   │  Ledger   │  │           │  │  lines    │  │  → paid   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  bistro-db (Database Layer)                     │   │
//! │  │          SQLite queries, migrations, ledger, idempotency        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Order, OrderLine, ledger entries)
//! - [`money`] - Money type with integer arithmetic
//! - [`builder`] - Cart → order line expansion, menu slot rules
//! - [`status`] - Order status state machine
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use bistro_core::types::OrderStatus;
//!
//! let next = OrderStatus::Pending.transition(OrderStatus::Paid).unwrap();
//! assert_eq!(next, OrderStatus::Paid);
//! assert!(next.transition(OrderStatus::Cancelled).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod builder;
pub mod error;
pub mod money;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use builder::{
    CartLine, CatalogLookup, CatalogSnapshot, OrderBuilder, OrderDraft, OrderRequest,
    SlotSelection, StockMovement,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines in a single submitted cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single cart line.
///
/// ## Business Reason
/// Catches typing 1000 instead of 10 at the till.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Maximum length of a caller-supplied idempotency key.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Idempotency scope for order creation, keyed by payment attempt id.
pub const ORDER_CREATE_SCOPE: &str = "order-create";

/// Idempotency scope for till payments, keyed by a caller payment key.
pub const PAYMENT_SCOPE: &str = "pos-payment";

/// How long an idempotency record stays live by default (24 hours).
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: u64 = 24 * 60 * 60;
