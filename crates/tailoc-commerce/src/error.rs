//! # Commerce Error Types
//!
//! The single error type seen by callers of the ledger, catalog and order
//! workflow.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Commerce Error Categories                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │  Business Rule  │  │     Transaction         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Validation     │  │  TransactionConflict    │ │
//! │  │  ConfigLoad...  │  │  ProductNotFound│  │  TransactionTimeout     │ │
//! │  │                 │  │  InsufficientSt.│  │  Database               │ │
//! │  │                 │  │  InvalidTrans.. │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ValidationError → CoreError ─┐                                        │
//! │                               ├──► CommerceError ──► anyhow (CLI)      │
//! │  sqlx::Error → DbError ───────┘                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use tailoc_core::{CoreError, OrderStatus, ValidationError};
use tailoc_db::{DbError, TransactionError, TransactionFailure};

/// Result type alias for commerce operations.
pub type CommerceResult<T> = Result<T, CommerceError>;

/// Commerce error type covering every failure a caller can observe.
#[derive(Debug, Error)]
pub enum CommerceError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Business Rule Errors
    // =========================================================================
    /// Input rejected before touching the database.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("SKU already exists: {0}")]
    DuplicateSku(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// Not enough unreserved stock.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: i64,
        requested: i64,
    },

    /// Releasing more than is reserved.
    #[error("Cannot release {requested} of {product_id}: only {reserved} reserved")]
    InsufficientReserved {
        product_id: String,
        reserved: i64,
        requested: i64,
    },

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Amount overflow while computing {0}")]
    AmountOverflow(String),

    // =========================================================================
    // Transaction Errors
    // =========================================================================
    /// Lock contention persisted through every retry.
    #[error("Transaction conflict after {attempts} attempts: {message}")]
    TransactionConflict { attempts: u32, message: String },

    /// The transaction budget elapsed and the work was rolled back.
    #[error("Transaction timed out after {elapsed_ms}ms")]
    TransactionTimeout { elapsed_ms: u64 },

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(#[from] DbError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for CommerceError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ProductNotFound(id) => CommerceError::ProductNotFound(id),
            CoreError::OrderNotFound(id) => CommerceError::OrderNotFound(id),
            CoreError::InsufficientStock {
                product_id,
                available,
                requested,
            } => CommerceError::InsufficientStock {
                product_id,
                available,
                requested,
            },
            CoreError::InvalidTransition { order_id, from, to } => {
                CommerceError::InvalidTransition { order_id, from, to }
            }
            CoreError::AmountOverflow { context } => CommerceError::AmountOverflow(context),
            CoreError::Validation(e) => CommerceError::Validation(e),
        }
    }
}

impl From<TransactionFailure<CommerceError>> for CommerceError {
    fn from(failure: TransactionFailure<CommerceError>) -> Self {
        match failure {
            TransactionFailure::Aborted(err) => err,
            TransactionFailure::Conflict {
                attempts,
                last_error,
            } => CommerceError::TransactionConflict {
                attempts,
                message: last_error.to_string(),
            },
            TransactionFailure::Timeout { elapsed } => CommerceError::TransactionTimeout {
                elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            },
        }
    }
}

impl From<std::io::Error> for CommerceError {
    fn from(err: std::io::Error) -> Self {
        CommerceError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for CommerceError {
    fn from(err: toml::de::Error) -> Self {
        CommerceError::ConfigLoadFailed(err.to_string())
    }
}

impl TransactionError for CommerceError {
    fn is_transient(&self) -> bool {
        matches!(self, CommerceError::Database(e) if e.is_transient())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl CommerceError {
    /// Whether the caller sent something the store cannot satisfy, as
    /// opposed to an infrastructure failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CommerceError::Validation(_)
                | CommerceError::ProductNotFound(_)
                | CommerceError::DuplicateSku(_)
                | CommerceError::OrderNotFound(_)
                | CommerceError::InsufficientStock { .. }
                | CommerceError::InsufficientReserved { .. }
                | CommerceError::InvalidTransition { .. }
        )
    }

    /// Whether resubmitting the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CommerceError::TransactionConflict { .. } | CommerceError::TransactionTimeout { .. }
        ) || TransactionError::is_transient(self)
    }
}
