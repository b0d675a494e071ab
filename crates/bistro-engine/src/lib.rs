//! # bistro-engine: Order & Inventory Ledger Engine
//!
//! Turns a cart into a priced, paid and fulfillable order while keeping
//! stock consistent under concurrent sales, refunds and corrections.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         bistro-engine                                   │
//! │                                                                         │
//! │  create_order ──► Idempotency guard ──► OrderBuilder (bistro-core)      │
//! │       │                                      │                          │
//! │       │           ┌──────────────────────────┘                          │
//! │       ▼           ▼                                                     │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │  one transaction: claim + order + lines + `sale` ledger entries │  │
//! │  └──────────────────────────────┬───────────────────────────────────┘  │
//! │                                 │ commit                                │
//! │                                 ▼                                       │
//! │                      StockHub ──► dashboards, tills                     │
//! │                                                                         │
//! │  record_payment ──► payments + pending→paid          (one transaction)  │
//! │  cancel / refund ──► status + compensating entries   (one transaction)  │
//! │  redeem_order ──► INSERT OR IGNORE per line          (one transaction)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`engine`] - The [`Engine`] handle
//! - [`orders`] - Order creation, cancellation, refunds, cleanup
//! - [`payments`] - Payment recorder
//! - [`redemption`] - Redemption tracker
//! - [`inventory`] - Ledger appends and stock projection
//! - [`hub`] - Realtime stock hub
//! - [`config`] - Engine configuration (file + environment)
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bistro_engine::{Engine, EngineConfig, PaymentInput};
//! use bistro_core::{CartLine, OrderOrigin, OrderRequest, PaymentMethod};
//!
//! let engine = Engine::open(EngineConfig::load_or_default(None)).await?;
//! let mut stock = engine.subscribe("kitchen-display").await;
//!
//! let outcome = engine
//!     .create_order(OrderRequest {
//!         customer_id: None,
//!         contact_email: Some("guest@example.com".into()),
//!         origin: OrderOrigin::Pos,
//!         payment_attempt_id: Some(attempt_id),
//!         lines: vec![CartLine::simple("pommes", 2)],
//!     })
//!     .await?;
//!
//! let order_id = &outcome.receipt.order.id;
//! engine
//!     .record_payment(order_id, PaymentInput::new(PaymentMethod::Cash, 1100), None)
//!     .await?;
//! engine.redeem_order(order_id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod hub;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod redemption;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{EngineConfig, StockPolicy};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use hub::{StockHub, StockStream};
pub use orders::{OrderDetails, OrderOutcome, OrderReceipt};
pub use payments::{PaymentInput, PaymentOutcome, PaymentReceipt};
