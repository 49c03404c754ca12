//! # Validation Module
//!
//! Input validation for catalogue, inventory and order operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: CLI / caller                                                 │
//! │  └── Type validation (argument parsing, deserialization)               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Services (tailoc-commerce)                                   │
//! │  └── THIS MODULE: Business rule validation before any transaction      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK (stock >= reserved, reserved >= 0)                          │
//! │  ├── UNIQUE (sku)                                                      │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::order::OrderLine;
use crate::types::NewProduct;
use crate::{MAX_ITEM_QUANTITY, MAX_ORDER_LINES, MAX_STOCK_DELTA};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use tailoc_core::validation::validate_sku;
///
/// assert!(validate_sku("LOA-JBL-PARTY310").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name: non-empty, at most 200 characters.
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a user reference.
///
/// User ids come from the account service and are opaque here, so only
/// presence, length and the absence of the cache-key separator are checked.
pub fn validate_user_id(user_id: &str) -> ValidationResult<()> {
    if user_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "user_id".to_string(),
        });
    }

    if user_id.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "user_id".to_string(),
            max: 64,
        });
    }

    if user_id.contains(':') || user_id.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "user_id".to_string(),
            reason: "must not contain ':' or whitespace".to_string(),
        });
    }

    Ok(())
}

/// Validates an optional free-text reason (adjustments, cancellations).
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    if reason.chars().count() > 500 {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: 500,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an order quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ```rust
/// use tailoc_core::validation::validate_quantity;
///
/// assert!(validate_quantity(3).is_ok());
/// assert!(validate_quantity(0).is_err());
/// assert!(validate_quantity(1000).is_err());
/// ```
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a stock adjustment delta: non-zero, within ±MAX_STOCK_DELTA.
///
/// ```rust
/// use tailoc_core::validation::validate_stock_delta;
///
/// assert!(validate_stock_delta(-2).is_ok());
/// assert!(validate_stock_delta(0).is_err());
/// assert!(validate_stock_delta(i64::MAX).is_err());
/// ```
pub fn validate_stock_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::MustBeNonZero {
            field: "delta".to_string(),
        });
    }

    if !(-MAX_STOCK_DELTA..=MAX_STOCK_DELTA).contains(&delta) {
        return Err(ValidationError::OutOfRange {
            field: "delta".to_string(),
            min: -MAX_STOCK_DELTA,
            max: MAX_STOCK_DELTA,
        });
    }

    Ok(())
}

/// Validates a price in minor units. Zero is allowed (gifts, promo items).
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a non-negative counter such as initial stock or a threshold.
pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

// =============================================================================
// Composite Validators
// =============================================================================

/// Validates the input for a new product.
pub fn validate_new_product(input: &NewProduct) -> ValidationResult<()> {
    validate_sku(&input.sku)?;
    validate_product_name(&input.name)?;
    validate_price_cents(input.price_cents)?;
    validate_non_negative("initial_stock", input.initial_stock)?;
    if input.initial_stock > MAX_STOCK_DELTA {
        return Err(ValidationError::OutOfRange {
            field: "initial_stock".to_string(),
            min: 0,
            max: MAX_STOCK_DELTA,
        });
    }
    validate_non_negative("low_stock_threshold", input.low_stock_threshold)?;
    Ok(())
}

/// Validates raw order lines before they are merged.
///
/// ## Rules
/// - At least one line
/// - At most MAX_ORDER_LINES lines
/// - Every product id is a UUID
/// - Every quantity passes [`validate_quantity`]
pub fn validate_order_lines(lines: &[OrderLine]) -> ValidationResult<()> {
    if lines.is_empty() {
        return Err(ValidationError::Required {
            field: "items".to_string(),
        });
    }

    if lines.len() > MAX_ORDER_LINES {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_ORDER_LINES as i64,
        });
    }

    for line in lines {
        validate_uuid(&line.product_id)?;
        validate_quantity(line.quantity)?;
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ```rust
/// use tailoc_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
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

    const PID: &str = "550e8400-e29b-41d4-a716-446655440000";

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("LOA-JBL-PARTY310").is_ok());
        assert!(validate_sku("mic_shure_01").is_ok());

        assert!(validate_sku("").is_err());
        assert!(validate_sku("   ").is_err());
        assert!(validate_sku("has space").is_err());
        assert!(validate_sku(&"A".repeat(100)).is_err());
    }

    #[test]
    fn test_validate_product_name() {
        assert!(validate_product_name("Loa kéo JBL PartyBox 310").is_ok());
        assert!(validate_product_name("").is_err());
        assert!(validate_product_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("user-42").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("user:42").is_err());
        assert!(validate_user_id("user 42").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_stock_delta() {
        assert!(validate_stock_delta(5).is_ok());
        assert!(validate_stock_delta(-5).is_ok());
        assert!(matches!(
            validate_stock_delta(0),
            Err(ValidationError::MustBeNonZero { .. })
        ));

        assert!(validate_stock_delta(MAX_STOCK_DELTA).is_ok());
        assert!(validate_stock_delta(-MAX_STOCK_DELTA).is_ok());
        assert!(matches!(
            validate_stock_delta(i64::MAX),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(matches!(
            validate_stock_delta(i64::MIN),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_new_product() {
        let mut input = NewProduct {
            sku: "AMP-01".to_string(),
            name: "Amply".to_string(),
            price_cents: 100,
            initial_stock: 0,
            low_stock_threshold: 2,
        };
        assert!(validate_new_product(&input).is_ok());

        input.initial_stock = -1;
        assert!(validate_new_product(&input).is_err());

        input.initial_stock = MAX_STOCK_DELTA + 1;
        assert!(matches!(
            validate_new_product(&input),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_order_lines() {
        assert!(validate_order_lines(&[]).is_err());
        assert!(validate_order_lines(&[OrderLine::new(PID, 2)]).is_ok());
        assert!(validate_order_lines(&[OrderLine::new(PID, 0)]).is_err());
        assert!(validate_order_lines(&[OrderLine::new("nope", 1)]).is_err());

        let too_many: Vec<_> = (0..=MAX_ORDER_LINES).map(|_| OrderLine::new(PID, 1)).collect();
        assert!(validate_order_lines(&too_many).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid(PID).is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("123").is_err());
    }
}
