//! # tailoc-db: Database Layer for Audio Tài Lộc
//!
//! SQLite storage for products, the inventory ledger and orders, plus the
//! [`TransactionManager`] that runs multi-step writes as one retried unit.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Audio Tài Lộc Data Flow                            │
//! │                                                                         │
//! │  OrderWorkflow::create_order (tailoc-commerce)                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tailoc-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐  ┌────────────────┐  ┌──────────────────┐  │   │
//! │  │   │   Database    │  │  Repositories  │  │TransactionManager│  │   │
//! │  │   │   (pool.rs)   │  │                │  │                  │  │   │
//! │  │   │               │  │ ProductRepo    │  │ BEGIN            │  │   │
//! │  │   │ SqlitePool    │◄─│ InventoryRepo  │◄─│ retry on busy    │  │   │
//! │  │   │ Migrations    │  │ OrderRepo      │  │ overall timeout  │  │   │
//! │  │   └───────────────┘  └────────────────┘  └──────────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Product, inventory and order repositories
//! - [`transaction`] - Retrying unit-of-work runner
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tailoc_db::{Database, DbConfig, TransactionOptions};
//!
//! let db = Database::new(DbConfig::new("tailoc.db")).await?;
//! let tx = db.transactions(TransactionOptions::default());
//!
//! let outcome = tx
//!     .execute("bump", tx.defaults(), |conn| {
//!         Box::pin(async move {
//!             ProductRepository::adjust_stock(conn, "p-1", 5, Utc::now()).await
//!         })
//!     })
//!     .await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod transaction;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::inventory::InventoryRepository;
pub use repository::order::OrderRepository;
pub use repository::product::ProductRepository;

pub use transaction::{
    TransactionError, TransactionFailure, TransactionManager, TransactionOptions,
    TransactionOutcome, TransactionStats, TxFuture,
};
