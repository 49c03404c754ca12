//! # tailoc-core: Pure Business Logic for Tài Lộc Commerce
//!
//! Domain types and rules for the order-placement core. Nothing in this crate
//! touches a database, a cache or the network.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Tài Lộc Order Placement                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              tailoc-commerce (OrderWorkflow, Ledger)            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tailoc-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │   order   │  │ validation│  │   │
//! │  │   │  Product  │  │   Money   │  │ OrderDraft│  │   rules   │  │   │
//! │  │   │  Order    │  │           │  │ status SM │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CACHE • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                tailoc-db (SQLite, TransactionManager)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Order, OrderItem, InventoryMovement)
//! - [`money`] - Money type with integer arithmetic
//! - [`order`] - Order state machine and order planning
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example
//!
//! ```rust
//! use tailoc_core::money::Money;
//!
//! let unit = Money::from_cents(1_250_000);
//! let line = unit.checked_mul_quantity(2).unwrap();
//! assert_eq!(line.cents(), 2_500_000);
//! ```

pub mod error;
pub mod money;
pub mod order;
pub mod types;
pub mod validation;

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use order::{prepare_lines, OrderDraft, OrderLine, PricedLine};
pub use types::*;

/// Maximum number of distinct products in one order.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single product in one order.
///
/// Guards against typos such as 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Largest single stock movement, and the largest opening stock.
///
/// Keeps `stock + delta` far from `i64` overflow inside SQLite.
pub const MAX_STOCK_DELTA: i64 = 1_000_000;

/// Number of orders returned by a user's order history.
pub const USER_ORDER_HISTORY_LIMIT: u32 = 50;
