//! # Order Workflow
//!
//! Places and cancels orders. Every order is created inside one transaction
//! together with its items and the stock it consumes.
//!
//! ## Order Creation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        create_order(user, lines)                        │
//! │                                                                         │
//! │  1. Validate    user id, 1..=100 lines, qty 1..=999, merge duplicates  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  2. TransactionManager::execute  ─────────────── retried on busy ──┐    │
//! │     ┌──────────────────────────────────────────────────────────┐   │    │
//! │     │ load products        → ProductNotFound                   │   │    │
//! │     │ plan: available ≥ qty for EVERY line → InsufficientStock │   │    │
//! │     │ snapshot prices, totals, status = confirmed              │   │    │
//! │     │ guarded decrement + 'out' movement per line              │   │    │
//! │     │ insert order + items                                     │   │    │
//! │     └──────────────────────────────────────────────────────────┘   │    │
//! │       │ commit                                 any error: rollback ┘    │
//! │       ▼                                                                 │
//! │  3. Invalidate  user:{id}:orders, product:{id} per line, listings      │
//! │  4. Publish     OrderConfirmed, StockAdjusted…, LowStock…              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancellation
//! A confirmed order is cancelled in one transaction that restocks each
//! item with an `in` movement referencing the order. Cancelling twice is an
//! `InvalidTransition`.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use tailoc_cache::{CacheKeys, CacheOptions};
use tailoc_core::validation::{validate_reason, validate_user_id};
use tailoc_core::{
    prepare_lines, MovementKind, OrderDetails, OrderDraft, OrderLine, OrderStatus,
    USER_ORDER_HISTORY_LIMIT,
};
use tailoc_db::{DbError, OrderRepository, ProductRepository};

use crate::context::CommerceContext;
use crate::error::{CommerceError, CommerceResult};
use crate::events::DomainEvent;
use crate::inventory::{invalidate_stock, AppliedChange, StockChange};

/// Committed order plus the stock changes it caused.
struct Placed {
    details: OrderDetails,
    changes: Vec<AppliedChange>,
}

#[derive(Debug, Clone)]
pub struct OrderWorkflow {
    ctx: CommerceContext,
}

impl OrderWorkflow {
    pub fn new(ctx: CommerceContext) -> Self {
        OrderWorkflow { ctx }
    }

    /// Creates a confirmed order, or nothing at all.
    ///
    /// ## Errors
    /// - `Validation` for malformed input
    /// - `ProductNotFound` for unknown or inactive products
    /// - `InsufficientStock` if any line exceeds available stock
    /// - `TransactionConflict` / `TransactionTimeout`
    pub async fn create_order(
        &self,
        user_id: &str,
        lines: &[OrderLine],
    ) -> CommerceResult<OrderDetails> {
        validate_user_id(user_id)?;
        let lines: Arc<[OrderLine]> = prepare_lines(lines)?.into();
        let user_id: Arc<str> = Arc::from(user_id);

        let transactions = self.ctx.transactions();
        let outcome = transactions
            .execute("orders.create", transactions.defaults(), |conn| {
                let lines = Arc::clone(&lines);
                let user_id = Arc::clone(&user_id);
                Box::pin(async move {
                    let now = Utc::now();
                    let ids: Vec<String> = lines.iter().map(|l| l.product_id.clone()).collect();
                    let products = ProductRepository::fetch_many(&mut *conn, &ids).await?;

                    let details = OrderDraft::plan(&user_id, &lines, &products)?.confirm(now)?;

                    let mut changes = Vec::with_capacity(details.items.len());
                    for item in &details.items {
                        let change = StockChange {
                            product_id: item.product_id.clone(),
                            kind: MovementKind::Out,
                            quantity: item.quantity,
                            reason: Some("order placed".to_string()),
                            reference_id: Some(details.order.id.clone()),
                        };
                        changes.push(change.apply(&mut *conn, now).await?);
                    }

                    OrderRepository::insert_details(&mut *conn, &details).await?;

                    Ok::<_, CommerceError>(Placed { details, changes })
                })
            })
            .await;

        let attempts = outcome.attempts;
        let placed = outcome.into_result().map_err(|failure| {
            let err = CommerceError::from(failure);
            if !err.is_client_error() {
                warn!(user_id = %user_id, attempts, error = %err, "Order creation failed");
            }
            err
        })?;

        let order = &placed.details.order;
        self.after_commit(&order.user_id, &placed.changes);
        self.ctx.events().publish(DomainEvent::OrderConfirmed {
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            total_cents: order.total_cents,
            item_count: order.item_count,
        });
        for change in &placed.changes {
            self.ctx.events().publish_all(change.events());
        }

        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            total = %order.total(),
            items = placed.details.items.len(),
            attempts,
            "Order confirmed"
        );

        Ok(placed.details)
    }

    /// Cancels an order. Confirmed orders give their stock back.
    pub async fn cancel_order(
        &self,
        order_id: &str,
        reason: Option<&str>,
    ) -> CommerceResult<OrderDetails> {
        if let Some(reason) = reason {
            validate_reason(reason)?;
        }
        let order_id: Arc<str> = Arc::from(order_id);
        let reason: Option<Arc<str>> = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(Arc::from);

        let transactions = self.ctx.transactions();
        let outcome = transactions
            .execute("orders.cancel", transactions.defaults(), |conn| {
                let order_id = Arc::clone(&order_id);
                let reason = reason.clone();
                Box::pin(async move {
                    let now = Utc::now();
                    let mut order = OrderRepository::fetch_order(&mut *conn, &order_id)
                        .await?
                        .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))?;
                    let items = OrderRepository::fetch_items(&mut *conn, &order_id).await?;

                    let previous = order.status;
                    order.transition(OrderStatus::Cancelled, now)?;
                    order.cancel_reason = reason.as_deref().map(str::to_string);

                    if !OrderRepository::update_status(&mut *conn, &order, previous).await? {
                        // Lost a race with another writer; the retry re-reads.
                        return Err(CommerceError::Database(DbError::Conflict(format!(
                            "order {} changed concurrently",
                            order.id
                        ))));
                    }

                    let mut changes = Vec::new();
                    if previous == OrderStatus::Confirmed {
                        for item in &items {
                            let change = StockChange {
                                product_id: item.product_id.clone(),
                                kind: MovementKind::In,
                                quantity: item.quantity,
                                reason: Some("order cancelled".to_string()),
                                reference_id: Some(order.id.clone()),
                            };
                            changes.push(change.apply(&mut *conn, now).await?);
                        }
                    }

                    Ok::<_, CommerceError>(Placed {
                        details: OrderDetails { order, items },
                        changes,
                    })
                })
            })
            .await;

        let cancelled = outcome.into_result()?;

        let order = &cancelled.details.order;
        self.after_commit(&order.user_id, &cancelled.changes);
        self.ctx.events().publish(DomainEvent::OrderCancelled {
            order_id: order.id.clone(),
            user_id: order.user_id.clone(),
            reason: order.cancel_reason.clone(),
        });
        for change in &cancelled.changes {
            self.ctx.events().publish_all(change.events());
        }

        info!(
            order_id = %order.id,
            user_id = %order.user_id,
            restocked = cancelled.changes.len(),
            "Order cancelled"
        );

        Ok(cancelled.details)
    }

    pub async fn get_order(&self, order_id: &str) -> CommerceResult<OrderDetails> {
        self.ctx
            .database()
            .orders()
            .get(order_id)
            .await?
            .ok_or_else(|| CommerceError::OrderNotFound(order_id.to_string()))
    }

    /// A user's latest orders, newest first (cached).
    pub async fn user_orders(&self, user_id: &str) -> CommerceResult<Vec<OrderDetails>> {
        validate_user_id(user_id)?;

        let options = CacheOptions::new()
            .ttl(self.ctx.config().cache.user_orders_ttl())
            .tag(CacheKeys::user_orders_tag(user_id));

        let orders = self.ctx.database().orders();
        self.ctx
            .cache()
            .get_or_compute(&CacheKeys::user_orders(user_id), options, || async {
                Ok::<_, CommerceError>(
                    orders
                        .list_for_user(user_id, USER_ORDER_HISTORY_LIMIT)
                        .await?,
                )
            })
            .await
    }

    /// Order counts per status.
    pub async fn status_counts(&self) -> CommerceResult<Vec<(OrderStatus, i64)>> {
        Ok(self.ctx.database().orders().status_counts().await?)
    }

    fn after_commit(&self, user_id: &str, changes: &[AppliedChange]) {
        let cache = self.ctx.cache();
        cache.invalidate_by_tag(&CacheKeys::user_orders_tag(user_id));
        for change in changes {
            invalidate_stock(cache, &change.product.id);
        }
    }
}
