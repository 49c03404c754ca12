//! # Order Repository
//!
//! Database operations for orders and order items.
//!
//! ## Atomic Creation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │    products: guarded stock decrement per line                          │
//! │    inventory_movements: one 'out' row per line                         │
//! │    orders: INSERT ──┐                                                   │
//! │    order_items: INSERT × N  (insert_details)                           │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any error before COMMIT → ROLLBACK: no order row, no items, stock     │
//! │  untouched.                                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use crate::error::DbResult;
use tailoc_core::{Order, OrderDetails, OrderItem, OrderStatus};

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // =========================================================================
    // Pooled operations
    // =========================================================================

    /// Gets an order with its items.
    pub async fn get(&self, id: &str) -> DbResult<Option<OrderDetails>> {
        let Some(order) = Self::fetch_order(&self.pool, id).await? else {
            return Ok(None);
        };
        let items = Self::fetch_items(&self.pool, id).await?;
        Ok(Some(OrderDetails { order, items }))
    }

    /// A user's most recent orders with items, newest first.
    pub async fn list_for_user(&self, user_id: &str, limit: u32) -> DbResult<Vec<OrderDetails>> {
        debug!(user_id = %user_id, limit, "Listing orders for user");

        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, status, subtotal_cents, total_cents, item_count,
                   created_at, updated_at, confirmed_at, cancelled_at, cancel_reason
            FROM orders
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(user_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, order_id, product_id, sku_snapshot, name_snapshot, quantity, \
             unit_price_cents, line_total_cents, created_at \
             FROM order_items WHERE order_id IN (",
        );
        let mut separated = builder.separated(", ");
        for order in &orders {
            separated.push_bind(order.id.as_str());
        }
        separated.push_unseparated(") ORDER BY rowid ASC");

        let items = builder
            .build_query_as::<OrderItem>()
            .fetch_all(&self.pool)
            .await?;

        let mut by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for item in items {
            by_order.entry(item.order_id.clone()).or_default().push(item);
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = by_order.remove(&order.id).unwrap_or_default();
                OrderDetails { order, items }
            })
            .collect())
    }

    /// Order counts per status.
    pub async fn status_counts(&self) -> DbResult<Vec<(OrderStatus, i64)>> {
        let counts = sqlx::query_as::<_, (OrderStatus, i64)>(
            "SELECT status, COUNT(*) FROM orders GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(counts)
    }

    // =========================================================================
    // Executor-generic operations
    // =========================================================================

    pub async fn fetch_order<'e, X>(executor: X, id: &str) -> DbResult<Option<Order>>
    where
        X: Executor<'e, Database = Sqlite>,
    {
        debug!(id = %id, "Getting order");

        let order = sqlx::query_as::<_, Order>(
            r#"
            SELECT id, user_id, status, subtotal_cents, total_cents, item_count,
                   created_at, updated_at, confirmed_at, cancelled_at, cancel_reason
            FROM orders
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(order)
    }

    pub async fn fetch_items<'e, X>(executor: X, order_id: &str) -> DbResult<Vec<OrderItem>>
    where
        X: Executor<'e, Database = Sqlite>,
    {
        let items = sqlx::query_as::<_, OrderItem>(
            r#"
            SELECT id, order_id, product_id, sku_snapshot, name_snapshot, quantity,
                   unit_price_cents, line_total_cents, created_at
            FROM order_items
            WHERE order_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(executor)
        .await?;

        Ok(items)
    }

    /// Writes the new status and its timestamps, only if the stored status
    /// is still `expected`. Returns whether the row was updated.
    pub async fn update_status<'e, X>(
        executor: X,
        order: &Order,
        expected: OrderStatus,
    ) -> DbResult<bool>
    where
        X: Executor<'e, Database = Sqlite>,
    {
        debug!(id = %order.id, from = %expected, to = %order.status, "Updating order status");

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = ?2, updated_at = ?3, confirmed_at = ?4,
                cancelled_at = ?5, cancel_reason = ?6
            WHERE id = ?1 AND status = ?7
            "#,
        )
        .bind(&order.id)
        .bind(order.status)
        .bind(order.updated_at)
        .bind(order.confirmed_at)
        .bind(order.cancelled_at)
        .bind(&order.cancel_reason)
        .bind(expected)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Transaction-only operations
    // =========================================================================

    /// Inserts an order and all its items on the transaction's connection.
    pub async fn insert_details(conn: &mut SqliteConnection, details: &OrderDetails) -> DbResult<()> {
        let order = &details.order;
        debug!(id = %order.id, items = details.items.len(), "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, user_id, status, subtotal_cents, total_cents, item_count,
                created_at, updated_at, confirmed_at, cancelled_at, cancel_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&order.id)
        .bind(&order.user_id)
        .bind(order.status)
        .bind(order.subtotal_cents)
        .bind(order.total_cents)
        .bind(order.item_count)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.confirmed_at)
        .bind(order.cancelled_at)
        .bind(&order.cancel_reason)
        .execute(&mut *conn)
        .await?;

        for item in &details.items {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, product_id, sku_snapshot, name_snapshot, quantity,
                    unit_price_cents, line_total_cents, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&item.id)
            .bind(&item.order_id)
            .bind(&item.product_id)
            .bind(&item.sku_snapshot)
            .bind(&item.name_snapshot)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.line_total_cents)
            .bind(item.created_at)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }
}
