//! # Order Planning
//!
//! Turns requested order lines into a priced, stock-checked draft and then
//! into a confirmed order with immutable item snapshots.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  [OrderLine]  ──prepare_lines──▶  merged, validated lines              │
//! │                                        │                                │
//! │  [Product] (loaded in the tx)  ────────┤                                │
//! │                                        ▼                                │
//! │                              OrderDraft::plan                           │
//! │                              ├── ProductNotFound   (missing/inactive)   │
//! │                              ├── InsufficientStock (available < qty)    │
//! │                              └── AmountOverflow                         │
//! │                                        │                                │
//! │                                        ▼                                │
//! │                              OrderDraft::confirm                        │
//! │                              └── Order(Confirmed) + [OrderItem]         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Planning is all-or-nothing: a draft only exists when every line can be
//! fulfilled, so callers never decrement stock for a partially valid order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Order, OrderDetails, OrderItem, OrderStatus, Product};
use crate::validation::{validate_order_lines, validate_user_id};
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// Order Line
// =============================================================================

/// A requested product and quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: String,
    pub quantity: i64,
}

impl OrderLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        OrderLine {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Validates raw lines and merges duplicates by product, keeping first-seen
/// order.
///
/// ```rust
/// use tailoc_core::order::{prepare_lines, OrderLine};
///
/// let pid = "550e8400-e29b-41d4-a716-446655440000";
/// let merged = prepare_lines(&[OrderLine::new(pid, 2), OrderLine::new(pid, 3)]).unwrap();
/// assert_eq!(merged, vec![OrderLine::new(pid, 5)]);
/// ```
pub fn prepare_lines(lines: &[OrderLine]) -> CoreResult<Vec<OrderLine>> {
    validate_order_lines(lines)?;

    let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }

    if merged.iter().any(|line| line.quantity > MAX_ITEM_QUANTITY) {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        }
        .into());
    }

    Ok(merged)
}

// =============================================================================
// Priced Line
// =============================================================================

/// An order line with the product data frozen at planning time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedLine {
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub line_total: Money,
}

// =============================================================================
// Order Draft
// =============================================================================

/// A stock-checked, priced order that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub user_id: String,
    pub lines: Vec<PricedLine>,
    pub subtotal: Money,
    pub total: Money,
    pub item_count: i64,
}

impl OrderDraft {
    /// Plans an order against the current product rows.
    ///
    /// `lines` should come from [`prepare_lines`]. `products` must be the
    /// rows read inside the same transaction that will decrement stock.
    pub fn plan(user_id: &str, lines: &[OrderLine], products: &[Product]) -> CoreResult<Self> {
        validate_user_id(user_id)?;

        let mut priced = Vec::with_capacity(lines.len());
        let mut subtotal = Money::zero();
        let mut item_count: i64 = 0;

        for line in lines {
            let product = products
                .iter()
                .find(|p| p.id == line.product_id && p.is_active)
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))?;

            if !product.can_fulfil(line.quantity) {
                return Err(CoreError::InsufficientStock {
                    product_id: product.id.clone(),
                    available: product.available(),
                    requested: line.quantity,
                });
            }

            let line_total = product
                .price()
                .checked_mul_quantity(line.quantity)
                .ok_or_else(|| CoreError::AmountOverflow {
                    context: format!("line total for {}", product.sku),
                })?;

            subtotal = subtotal
                .checked_add(line_total)
                .ok_or_else(|| CoreError::AmountOverflow {
                    context: "order subtotal".to_string(),
                })?;
            item_count += line.quantity;

            priced.push(PricedLine {
                product_id: product.id.clone(),
                sku: product.sku.clone(),
                name: product.name.clone(),
                unit_price: product.price(),
                quantity: line.quantity,
                line_total,
            });
        }

        Ok(OrderDraft {
            user_id: user_id.to_string(),
            lines: priced,
            subtotal,
            // No shipping or discounts in this slice.
            total: subtotal,
            item_count,
        })
    }

    /// Builds the confirmed order and its item snapshots.
    pub fn confirm(self, now: DateTime<Utc>) -> CoreResult<OrderDetails> {
        let mut order = Order {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id,
            status: OrderStatus::Pending,
            subtotal_cents: self.subtotal.cents(),
            total_cents: self.total.cents(),
            item_count: self.item_count,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            cancelled_at: None,
            cancel_reason: None,
        };
        order.transition(OrderStatus::Confirmed, now)?;

        let items = self
            .lines
            .into_iter()
            .map(|line| OrderItem {
                id: Uuid::new_v4().to_string(),
                order_id: order.id.clone(),
                product_id: line.product_id,
                sku_snapshot: line.sku,
                name_snapshot: line.name,
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                line_total_cents: line.line_total.cents(),
                created_at: now,
            })
            .collect();

        Ok(OrderDetails { order, items })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEAKER: &str = "11111111-1111-4111-8111-111111111111";
    const MIC: &str = "22222222-2222-4222-8222-222222222222";

    fn product(id: &str, price_cents: i64, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            sku: format!("SKU-{}", &id[..4]),
            name: format!("Product {}", &id[..4]),
            price_cents,
            stock,
            reserved: 0,
            low_stock_threshold: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_prepare_lines_merges_duplicates() {
        let lines = vec![
            OrderLine::new(SPEAKER, 1),
            OrderLine::new(MIC, 2),
            OrderLine::new(SPEAKER, 2),
        ];
        let merged = prepare_lines(&lines).unwrap();
        assert_eq!(merged, vec![OrderLine::new(SPEAKER, 3), OrderLine::new(MIC, 2)]);
    }

    #[test]
    fn test_prepare_lines_rejects_merged_overflow() {
        let lines = vec![OrderLine::new(SPEAKER, 600), OrderLine::new(SPEAKER, 600)];
        assert!(matches!(
            prepare_lines(&lines),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
    }

    #[test]
    fn test_plan_computes_totals() {
        let products = vec![product(SPEAKER, 1_000, 5), product(MIC, 250, 10)];
        let lines = vec![OrderLine::new(SPEAKER, 2), OrderLine::new(MIC, 4)];

        let draft = OrderDraft::plan("user-1", &lines, &products).unwrap();
        assert_eq!(draft.subtotal.cents(), 3_000);
        assert_eq!(draft.total.cents(), 3_000);
        assert_eq!(draft.item_count, 6);
        assert_eq!(draft.lines[1].line_total.cents(), 1_000);
    }

    #[test]
    fn test_plan_insufficient_stock() {
        let products = vec![product(SPEAKER, 1_000, 5)];
        let err = OrderDraft::plan("user-1", &[OrderLine::new(SPEAKER, 6)], &products).unwrap_err();

        match err {
            CoreError::InsufficientStock {
                available,
                requested,
                ..
            } => {
                assert_eq!(available, 5);
                assert_eq!(requested, 6);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_plan_fails_whole_order_when_one_line_fails() {
        let products = vec![product(SPEAKER, 1_000, 5), product(MIC, 250, 1)];
        let lines = vec![OrderLine::new(SPEAKER, 1), OrderLine::new(MIC, 2)];
        assert!(OrderDraft::plan("user-1", &lines, &products).is_err());
    }

    #[test]
    fn test_plan_missing_or_inactive_product() {
        let mut inactive = product(MIC, 250, 10);
        inactive.is_active = false;

        let err = OrderDraft::plan("user-1", &[OrderLine::new(SPEAKER, 1)], &[inactive.clone()])
            .unwrap_err();
        assert!(matches!(err, CoreError::ProductNotFound(id) if id == SPEAKER));

        let err = OrderDraft::plan("user-1", &[OrderLine::new(MIC, 1)], &[inactive]).unwrap_err();
        assert!(matches!(err, CoreError::ProductNotFound(_)));
    }

    #[test]
    fn test_plan_overflow_is_reported() {
        let products = vec![product(SPEAKER, i64::MAX / 2, 10)];
        let err = OrderDraft::plan("user-1", &[OrderLine::new(SPEAKER, 3)], &products).unwrap_err();
        assert!(matches!(err, CoreError::AmountOverflow { .. }));
    }

    #[test]
    fn test_confirm_snapshots_items() {
        let products = vec![product(SPEAKER, 1_000, 5)];
        let draft = OrderDraft::plan("user-1", &[OrderLine::new(SPEAKER, 3)], &products).unwrap();

        let details = draft.confirm(Utc::now()).unwrap();
        assert_eq!(details.order.status, OrderStatus::Confirmed);
        assert!(details.order.confirmed_at.is_some());
        assert_eq!(details.items.len(), 1);

        let item = &details.items[0];
        assert_eq!(item.order_id, details.order.id);
        assert_eq!(item.unit_price_cents, 1_000);
        assert_eq!(item.line_total_cents, 3_000);
        assert_eq!(item.sku_snapshot, products[0].sku);
    }
}
