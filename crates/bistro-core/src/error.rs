//! # Error Types
//!
//! Domain-specific error types for bistro-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  bistro-core errors (this file)                                        │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  bistro-db errors (separate crate)                                     │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  bistro-engine errors (separate crate)                                 │
//! │  └── EngineError      - What callers map to 4xx / 5xx                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError ─┐                                  │
//! │                         DbError ────┴──► EngineError → HTTP handler    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (product id, slot, status)
//! 3. Errors are enum variants, never String
//! 4. Every variant is detected before any write happens

use thiserror::Error;

use crate::types::OrderStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A product referenced by the cart does not exist in the catalog.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Bad bundle/slot input, or a product that cannot be sold.
    ///
    /// ## When This Occurs
    /// - A menu slot has no selection, or a selection names an unknown slot
    /// - The same slot is selected twice
    /// - The chosen option is not eligible for the slot
    /// - Selections were sent for a product that is not a menu
    /// - The product (or a chosen option) is inactive
    #[error("Invalid selection for product {product_id}: {reason}")]
    InvalidSelection { product_id: String, reason: String },

    /// Illegal order status change.
    ///
    /// ## Legal Transitions
    /// ```text
    /// pending ──► paid ──► refunded
    ///    │
    ///    └──────► cancelled
    /// ```
    #[error("Order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidSelection error.
    pub fn invalid_selection(product_id: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvalidSelection {
            product_id: product_id.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, invalid email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Two fields that exclude each other were both given.
    #[error("exactly one of {first} or {second} must be given")]
    ExactlyOne { first: String, second: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::invalid_selection("menu-1", "slot 'Drink' has no selection");
        assert_eq!(
            err.to_string(),
            "Invalid selection for product menu-1: slot 'Drink' has no selection"
        );

        let err = CoreError::InvalidTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Paid,
        };
        assert_eq!(err.to_string(), "Order cannot move from cancelled to paid");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "cart".to_string(),
        };
        assert_eq!(err.to_string(), "cart is required");

        let err = ValidationError::ExactlyOne {
            first: "customer_id".to_string(),
            second: "contact_email".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "exactly one of customer_id or contact_email must be given"
        );
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "quantity".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
