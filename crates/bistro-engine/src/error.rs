//! # Engine Error Types
//!
//! The error taxonomy callers of the engine see.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EngineError                                      │
//! │                                                                         │
//! │  Client errors (fix the request, don't retry)                          │
//! │  ├── Validation         - bad quantity, contact, amount, key           │
//! │  ├── InvalidSelection   - bundle/slot input, inactive product          │
//! │  ├── NotFound           - unknown product, order or line               │
//! │  ├── InvalidTransition  - order status does not allow the change      │
//! │  ├── InsufficientStock  - stock policy rejected the order              │
//! │  ├── NotRedeemable      - order is not paid                            │
//! │  └── Conflict           - unique constraint lost a race                │
//! │                                                                         │
//! │  Server errors                                                         │
//! │  ├── StorageFailure     - database trouble; safe to retry              │
//! │  └── Config             - configuration could not be loaded/saved      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use bistro_core::{CoreError, OrderStatus, ValidationError};
use bistro_db::DbError;
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Client Errors
    // =========================================================================
    /// Input failed validation before anything was written.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Bad bundle/slot input, or a product that cannot be sold.
    #[error("Invalid selection for product {product_id}: {reason}")]
    InvalidSelection { product_id: String, reason: String },

    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Order status does not allow the requested change.
    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The stock policy refused to oversell.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: String,
        requested: i64,
        available: i64,
    },

    /// Lines of an order can only be handed over once it is paid.
    #[error("Order {order_id} is {status} and cannot be redeemed")]
    NotRedeemable { order_id: String, status: OrderStatus },

    /// A uniqueness rule was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    // =========================================================================
    // Server Errors
    // =========================================================================
    /// Storage failed; the transaction was rolled back.
    #[error("Storage failure: {0}")]
    StorageFailure(String),

    /// Configuration could not be loaded, saved or validated.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Creates a NotFound error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Returns true if the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StorageFailure(_))
    }

    /// Returns true if the request itself is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            EngineError::StorageFailure(_) | EngineError::Config(_)
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => EngineError::not_found("Product", id),
            CoreError::InvalidSelection { product_id, reason } => {
                EngineError::InvalidSelection { product_id, reason }
            }
            CoreError::InvalidTransition { from, to } => {
                EngineError::InvalidTransition { from, to }
            }
            CoreError::Validation(err) => EngineError::Validation(err),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::UniqueViolation { field, value } => {
                EngineError::Conflict(format!("{field} '{value}' already exists"))
            }
            other => EngineError::StorageFailure(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::StorageFailure(format!("stored response unreadable: {err}"))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}
