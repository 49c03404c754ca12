//! # Domain Errors
//!
//! Raised by pure code: validators, order planning and the order state
//! machine. Nothing here knows about SQL.
//!
//! ```text
//! validate_*()            ──► ValidationError ──┐
//! OrderDraft::plan()      ──► CoreError ◄───────┘ (#[from])
//! Order::transition()     ──► CoreError::InvalidTransition
//!                                  │
//!                                  ▼
//!                   CommerceError (flattened, one level up)
//! ```

use thiserror::Error;

use crate::types::OrderStatus;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found (or is inactive).
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Requested quantity exceeds available stock.
    ///
    /// ## When This Occurs
    /// ```text
    /// Order line (qty: 6)
    ///      │
    ///      ▼
    /// Check: stock=5, reserved=0 → available=5
    ///      │
    ///      ▼
    /// InsufficientStock { product_id, available: 5, requested: 6 }
    /// ```
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Order cannot be found.
    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// The order state machine does not allow this transition.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A monetary computation overflowed i64.
    #[error("Amount overflow while computing {context}")]
    AmountOverflow { context: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
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

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustBeNonZero { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
