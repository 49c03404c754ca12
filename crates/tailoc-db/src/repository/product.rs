//! # Product Repository
//!
//! Database operations for products and their stock counters.
//!
//! ## Guarded Stock Updates
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE products SET stock = stock + :delta                             │
//! │  WHERE id = :id AND stock + :delta >= reserved                          │
//! │  RETURNING stock                                                        │
//! │                                                                         │
//! │  stock=5 reserved=0 delta=-3  → row updated, returns 2                  │
//! │  stock=5 reserved=0 delta=-6  → no row, caller reports shortage         │
//! │                                                                         │
//! │  The availability check and the write are one statement, so two       │
//! │  transactions can never both take the last unit.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Executor, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tailoc_core::Product;

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    // =========================================================================
    // Pooled operations
    // =========================================================================

    /// Gets a product by ID (active or not).
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        Self::fetch_by_id(&self.pool, id).await
    }

    /// Gets a product by SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        debug!(sku = %sku, "Getting product by SKU");

        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, price_cents, stock, reserved,
                   low_stock_threshold, is_active, created_at, updated_at
            FROM products
            WHERE sku = ?1
            "#,
        )
        .bind(sku)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Lists active products ordered by name.
    pub async fn list_active(&self, limit: u32, offset: u32) -> DbResult<Vec<Product>> {
        debug!(limit, offset, "Listing active products");

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, price_cents, stock, reserved,
                   low_stock_threshold, is_active, created_at, updated_at
            FROM products
            WHERE is_active = 1
            ORDER BY name ASC, id ASC
            LIMIT ?1 OFFSET ?2
            "#,
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Counts active products.
    pub async fn count_active(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Active products at or below their low-stock threshold, emptiest first.
    pub async fn low_stock(&self, limit: u32) -> DbResult<Vec<Product>> {
        debug!(limit, "Listing low-stock products");

        let products = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, price_cents, stock, reserved,
                   low_stock_threshold, is_active, created_at, updated_at
            FROM products
            WHERE is_active = 1
              AND low_stock_threshold > 0
              AND stock <= low_stock_threshold
            ORDER BY stock ASC, name ASC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Sets the low-stock threshold.
    pub async fn set_low_stock_threshold(
        &self,
        id: &str,
        threshold: i64,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        debug!(id = %id, threshold, "Setting low-stock threshold");

        let result = sqlx::query(
            "UPDATE products SET low_stock_threshold = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(threshold)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Order items keep referencing the row, so it is never removed.
    pub async fn deactivate(&self, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        debug!(id = %id, "Deactivating product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    // =========================================================================
    // Executor-generic operations (pool or transaction connection)
    // =========================================================================

    /// Fetches a product by ID.
    pub async fn fetch_by_id<'e, X>(executor: X, id: &str) -> DbResult<Option<Product>>
    where
        X: Executor<'e, Database = Sqlite>,
    {
        debug!(id = %id, "Getting product by ID");

        let product = sqlx::query_as::<_, Product>(
            r#"
            SELECT id, sku, name, price_cents, stock, reserved,
                   low_stock_threshold, is_active, created_at, updated_at
            FROM products
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await?;

        Ok(product)
    }

    /// Fetches every product whose ID is in `ids`. Missing IDs are simply
    /// absent from the result.
    pub async fn fetch_many<'e, X>(executor: X, ids: &[String]) -> DbResult<Vec<Product>>
    where
        X: Executor<'e, Database = Sqlite>,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = ids.len(), "Getting products by ID");

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, sku, name, price_cents, stock, reserved, \
             low_stock_threshold, is_active, created_at, updated_at \
             FROM products WHERE id IN (",
        );
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let products = builder
            .build_query_as::<Product>()
            .fetch_all(executor)
            .await?;

        Ok(products)
    }

    /// Inserts a new product.
    pub async fn insert<'e, X>(executor: X, product: &Product) -> DbResult<()>
    where
        X: Executor<'e, Database = Sqlite>,
    {
        debug!(id = %product.id, sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, price_cents, stock, reserved,
                low_stock_threshold, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.stock)
        .bind(product.reserved)
        .bind(product.low_stock_threshold)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(executor)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: product.sku.clone(),
            },
            other => other,
        })?;

        Ok(())
    }

    // =========================================================================
    // Stock counters (run inside a transaction)
    // =========================================================================

    /// Applies `delta` to stock if the result stays at or above `reserved`.
    ///
    /// Returns the new stock, or `None` when the product does not exist or
    /// the guard rejected the change.
    pub async fn adjust_stock(
        conn: &mut SqliteConnection,
        id: &str,
        delta: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<i64>> {
        debug!(id = %id, delta, "Adjusting stock");

        let new_stock: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET stock = stock + ?2, updated_at = ?3
            WHERE id = ?1 AND stock + ?2 >= reserved
            RETURNING stock
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(new_stock)
    }

    /// Applies `delta` to the reserved counter if it stays within
    /// `0..=stock`.
    ///
    /// Returns the new reserved quantity, or `None` when rejected.
    pub async fn adjust_reserved(
        conn: &mut SqliteConnection,
        id: &str,
        delta: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<i64>> {
        debug!(id = %id, delta, "Adjusting reserved stock");

        let new_reserved: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE products
            SET reserved = reserved + ?2, updated_at = ?3
            WHERE id = ?1
              AND reserved + ?2 >= 0
              AND stock >= reserved + ?2
            RETURNING reserved
            "#,
        )
        .bind(id)
        .bind(delta)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(new_reserved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::generate_id;
    use crate::{Database, DbConfig};

    fn product(sku: &str, stock: i64) -> Product {
        let now = Utc::now();
        Product {
            id: generate_id(),
            sku: sku.to_string(),
            name: format!("Product {sku}"),
            price_cents: 1_990_000,
            stock,
            reserved: 0,
            low_stock_threshold: 2,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    async fn db_with(products: &[Product]) -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        for p in products {
            ProductRepository::insert(db.pool(), p).await.unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let p = product("LOA-01", 5);
        let db = db_with(&[p.clone()]).await;

        let fetched = db.products().get_by_id(&p.id).await.unwrap().unwrap();
        assert_eq!(fetched.sku, "LOA-01");
        assert_eq!(fetched.stock, 5);

        let by_sku = db.products().get_by_sku("LOA-01").await.unwrap();
        assert_eq!(by_sku.map(|p| p.id), Some(p.id));
    }

    #[tokio::test]
    async fn test_duplicate_sku_is_reported() {
        let db = db_with(&[product("LOA-01", 5)]).await;
        let err = ProductRepository::insert(db.pool(), &product("LOA-01", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { value, .. } if value == "LOA-01"));
    }

    #[tokio::test]
    async fn test_fetch_many() {
        let a = product("A-1", 1);
        let b = product("B-1", 1);
        let db = db_with(&[a.clone(), b.clone()]).await;

        let ids = vec![a.id.clone(), b.id.clone(), generate_id()];
        let found = ProductRepository::fetch_many(db.pool(), &ids).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(ProductRepository::fetch_many(db.pool(), &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adjust_stock_guard() {
        let p = product("AMP-01", 5);
        let db = db_with(&[p.clone()]).await;
        let mut conn = db.pool().acquire().await.unwrap();

        let now = Utc::now();
        assert_eq!(
            ProductRepository::adjust_stock(&mut conn, &p.id, -3, now).await.unwrap(),
            Some(2)
        );
        assert_eq!(
            ProductRepository::adjust_stock(&mut conn, &p.id, -3, now).await.unwrap(),
            None
        );
        assert_eq!(
            ProductRepository::adjust_stock(&mut conn, "missing", 1, now).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_adjust_reserved_guard() {
        let p = product("MIC-01", 4);
        let db = db_with(&[p.clone()]).await;
        let mut conn = db.pool().acquire().await.unwrap();
        let now = Utc::now();

        assert_eq!(
            ProductRepository::adjust_reserved(&mut conn, &p.id, 3, now).await.unwrap(),
            Some(3)
        );
        // Stock cannot drop below what is reserved.
        assert_eq!(
            ProductRepository::adjust_stock(&mut conn, &p.id, -2, now).await.unwrap(),
            None
        );
        assert_eq!(
            ProductRepository::adjust_reserved(&mut conn, &p.id, 2, now).await.unwrap(),
            None
        );
        assert_eq!(
            ProductRepository::adjust_reserved(&mut conn, &p.id, -4, now).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_low_stock_and_deactivate() {
        let low = product("LOW-1", 1);
        let ok = product("OK-1", 50);
        let db = db_with(&[low.clone(), ok]).await;

        let found = db.products().low_stock(10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, low.id);

        db.products().deactivate(&low.id, Utc::now()).await.unwrap();
        assert!(db.products().low_stock(10).await.unwrap().is_empty());
        assert_eq!(db.products().count_active().await.unwrap(), 1);

        let err = db.products().deactivate("missing", Utc::now()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
