//! # Validation Module
//!
//! Input validation utilities for Bistro Ledger.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Storefront / till UI                                         │
//! │  └── Basic format checks, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Engine use case (Rust)                                       │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── THIS MODULE: rules checked before any write                       │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (quantity > 0)                                  │
//! │  ├── UNIQUE constraints (one redemption per line)                      │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use bistro_core::validation::{validate_quantity, validate_contact};
//!
//! validate_quantity(2).unwrap();
//! validate_contact(None, Some("guest@example.com")).unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::PaymentMethod;
use crate::{MAX_CART_LINES, MAX_IDEMPOTENCY_KEY_LEN, MAX_LINE_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_LINE_QUANTITY (999)
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a payment amount in cents for the given method.
///
/// ## Rules
/// - cash / card / twint: must be positive (> 0)
/// - gratis-*: zero allowed, never negative
///
/// ## Example
/// ```rust
/// use bistro_core::types::PaymentMethod;
/// use bistro_core::validation::validate_payment_amount;
///
/// assert!(validate_payment_amount(PaymentMethod::Cash, 1100).is_ok());
/// assert!(validate_payment_amount(PaymentMethod::Cash, 0).is_err());
/// assert!(validate_payment_amount(PaymentMethod::GratisStaff, 0).is_ok());
/// ```
pub fn validate_payment_amount(method: PaymentMethod, cents: i64) -> ValidationResult<()> {
    if method.is_gratis() {
        if cents < 0 {
            return Err(ValidationError::OutOfRange {
                field: "payment amount".to_string(),
                min: 0,
                max: i64::MAX,
            });
        }
        return Ok(());
    }

    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the number of lines in a submitted cart.
///
/// ## Rules
/// - At least one line
/// - At most MAX_CART_LINES (100)
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "cart".to_string(),
        });
    }

    if lines > MAX_CART_LINES {
        return Err(ValidationError::OutOfRange {
            field: "cart lines".to_string(),
            min: 1,
            max: MAX_CART_LINES as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Contact Validators
// =============================================================================

/// Validates the order contact: exactly one of customer id or email.
///
/// Blank strings count as absent.
pub fn validate_contact(
    customer_id: Option<&str>,
    contact_email: Option<&str>,
) -> ValidationResult<()> {
    let customer_id = customer_id.map(str::trim).filter(|s| !s.is_empty());
    let contact_email = contact_email.map(str::trim).filter(|s| !s.is_empty());

    match (customer_id, contact_email) {
        (Some(_), None) => Ok(()),
        (None, Some(email)) => validate_email(email),
        _ => Err(ValidationError::ExactlyOne {
            first: "customer_id".to_string(),
            second: "contact_email".to_string(),
        }),
    }
}

/// Minimal structural email check: one `@`, non-empty local part and a
/// dotted domain. Deliverability is not our concern.
pub fn validate_email(email: &str) -> ValidationResult<()> {
    if email.len() > 254 {
        return Err(ValidationError::TooLong {
            field: "contact_email".to_string(),
            max: 254,
        });
    }

    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "contact_email".to_string(),
            reason: "must look like name@domain.tld".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Key Validators
// =============================================================================

/// Validates a caller-supplied idempotency key.
///
/// ## Rules
/// - Not blank
/// - At most MAX_IDEMPOTENCY_KEY_LEN (128) characters
pub fn validate_idempotency_key(key: &str) -> ValidationResult<()> {
    if key.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "idempotency key".to_string(),
        });
    }

    if key.chars().count() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ValidationError::TooLong {
            field: "idempotency key".to_string(),
            max: MAX_IDEMPOTENCY_KEY_LEN,
        });
    }

    Ok(())
}

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use bistro_core::validation::validate_uuid;
///
/// assert!(validate_uuid("order_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("order_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_payment_amount() {
        assert!(validate_payment_amount(PaymentMethod::Twint, 1).is_ok());
        assert!(validate_payment_amount(PaymentMethod::Card, 0).is_err());
        assert!(validate_payment_amount(PaymentMethod::Cash, -100).is_err());

        assert!(validate_payment_amount(PaymentMethod::GratisVip, 0).is_ok());
        assert!(validate_payment_amount(PaymentMethod::GratisGuest, 550).is_ok());
        assert!(validate_payment_amount(PaymentMethod::GratisLoyalty, -1).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(1).is_ok());
        assert!(validate_cart_size(100).is_ok());
        assert!(validate_cart_size(0).is_err());
        assert!(validate_cart_size(101).is_err());
    }

    #[test]
    fn test_validate_contact() {
        assert!(validate_contact(Some("cust-1"), None).is_ok());
        assert!(validate_contact(None, Some("guest@example.com")).is_ok());

        // neither
        assert!(validate_contact(None, None).is_err());
        assert!(validate_contact(Some("  "), Some("")).is_err());
        // both
        assert!(validate_contact(Some("cust-1"), Some("guest@example.com")).is_err());
        // malformed email
        assert!(validate_contact(None, Some("guest.example.com")).is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("a@b.ch").is_ok());
        assert!(validate_email("@b.ch").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@@b.ch").is_err());
        assert!(validate_email("a b@c.ch").is_err());
    }

    #[test]
    fn test_validate_idempotency_key() {
        assert!(validate_idempotency_key("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_idempotency_key("   ").is_err());
        assert!(validate_idempotency_key(&"k".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("id", "").is_err());
        assert!(validate_uuid("id", "123").is_err());
    }
}
