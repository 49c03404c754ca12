//! # Domain Types
//!
//! Core domain types for the order-placement slice of the store.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Order      │   │   OrderItem     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  order_id (FK)  │       │
//! │  │  sku (business) │   │  user_id        │   │  product_id(FK) │       │
//! │  │  price_cents    │   │  status         │   │  *_snapshot     │       │
//! │  │  stock/reserved │   │  total_cents    │   │  unit_price     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ InventoryLevel  │   │  OrderStatus    │   │  MovementKind   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  stock          │   │  Pending        │   │  In / Out       │       │
//! │  │  reserved       │   │  Confirmed      │   │  Reserved       │       │
//! │  │  available      │   │  Cancelled      │   │  Unreserved     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stock Invariant
//! `available = stock - reserved` and `available >= 0` for every product at
//! every commit. The database layer enforces it with guarded updates and CHECK
//! constraints; [`Product::available`] is the in-memory view of the same rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product in the catalogue together with its stock counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name.
    pub name: String,

    /// Price in minor units.
    pub price_cents: i64,

    /// Units physically held.
    pub stock: i64,

    /// Units held back for pending work (never sellable).
    pub reserved: i64,

    /// `stock <= threshold` raises a low-stock event. Zero disables it.
    pub low_stock_threshold: i64,

    /// Whether the product is active (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Units that can still be sold.
    #[inline]
    pub fn available(&self) -> i64 {
        self.stock - self.reserved
    }

    /// Checks whether `quantity` units can be taken from available stock.
    #[inline]
    pub fn can_fulfil(&self, quantity: i64) -> bool {
        self.is_active && self.available() >= quantity
    }

    /// Checks the low-stock rule.
    pub fn is_low_stock(&self) -> bool {
        self.low_stock_threshold > 0 && self.stock <= self.low_stock_threshold
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub price_cents: i64,
    #[serde(default)]
    pub initial_stock: i64,
    #[serde(default)]
    pub low_stock_threshold: i64,
}

// =============================================================================
// Inventory
// =============================================================================

/// Read model of a product's stock counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLevel {
    pub product_id: String,
    pub sku: String,
    pub stock: i64,
    pub reserved: i64,
    pub available: i64,
    pub low_stock_threshold: i64,
    pub is_low_stock: bool,
}

impl From<&Product> for InventoryLevel {
    fn from(product: &Product) -> Self {
        InventoryLevel {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            stock: product.stock,
            reserved: product.reserved,
            available: product.available(),
            low_stock_threshold: product.low_stock_threshold,
            is_low_stock: product.is_low_stock(),
        }
    }
}

/// The kind of an inventory movement.
///
/// ```text
/// In          stock    += qty
/// Out         stock    -= qty
/// Reserved    reserved += qty
/// Unreserved  reserved -= qty
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    In,
    Out,
    Reserved,
    Unreserved,
}

impl MovementKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Reserved => "reserved",
            MovementKind::Unreserved => "unreserved",
        }
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the append-only inventory ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InventoryMovement {
    pub id: String,
    pub product_id: String,
    pub kind: MovementKind,
    /// Always positive; direction comes from `kind`.
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub reason: Option<String>,
    /// Order id or other external reference.
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Order Status
// =============================================================================

/// Lifecycle of an order.
///
/// ```text
///            ┌────────────┐
///            │  Pending   │
///            └─────┬──────┘
///          ┌───────┴────────┐
///          ▼                ▼
///   ┌────────────┐   ┌────────────┐
///   │ Confirmed  │──▶│ Cancelled  │
///   └────────────┘   └────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, stock not yet taken.
    Pending,
    /// Stock decremented, order accepted.
    Confirmed,
    /// Terminal.
    Cancelled,
}

impl OrderStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the state machine allows `self -> next`.
    pub const fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Confirmed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Confirmed, OrderStatus::Cancelled)
        )
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order
// =============================================================================

/// A customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub subtotal_cents: i64,
    pub total_cents: i64,
    /// Sum of line quantities.
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
}

impl Order {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Moves the order to `next`, stamping the matching timestamp.
    ///
    /// Returns `InvalidTransition` when the state machine forbids it; the
    /// order is left untouched in that case.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> CoreResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                order_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }

        match next {
            OrderStatus::Confirmed => self.confirmed_at = Some(now),
            OrderStatus::Cancelled => self.cancelled_at = Some(now),
            OrderStatus::Pending => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// Order Item
// =============================================================================

/// A line item in an order.
/// Uses the snapshot pattern to freeze product data at time of purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    /// SKU at time of purchase (frozen).
    pub sku_snapshot: String,
    /// Product name at time of purchase (frozen).
    pub name_snapshot: String,
    pub quantity: i64,
    /// Unit price at time of purchase (frozen).
    pub unit_price_cents: i64,
    /// unit_price × quantity.
    pub line_total_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl OrderItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// An order together with its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<OrderItem>,
}
