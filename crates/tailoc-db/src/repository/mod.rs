//! # Repository Module
//!
//! Database repository implementations.
//!
//! ## Two Ways In
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Pooled reads                      Inside a unit of work                │
//! │  ────────────                      ─────────────────────                │
//! │  db.products().get_by_id(id)       ProductRepository::fetch_many(conn)  │
//! │        │                           ProductRepository::adjust_stock(conn)│
//! │        │                           OrderRepository::insert_details(conn)│
//! │        ▼                                   │                            │
//! │  &SqlitePool                        &mut SqliteConnection               │
//! │  (any free connection)              (the connection holding the tx)     │
//! │                                                                         │
//! │  Both paths run the same SQL: the associated functions are generic     │
//! │  over `sqlx::Executor`, the pooled methods pass `&self.pool`.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Products and guarded stock counters
//! - [`inventory::InventoryRepository`] - Append-only movement ledger
//! - [`order::OrderRepository`] - Orders and their items

pub mod inventory;
pub mod order;
pub mod product;

use uuid::Uuid;

/// Generates a new entity ID (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
