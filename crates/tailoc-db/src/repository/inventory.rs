//! # Inventory Movement Repository
//!
//! Append-only ledger of stock and reservation changes. Rows are written in
//! the same transaction as the counter update they describe and are never
//! updated or deleted.

use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tailoc_core::InventoryMovement;

/// Repository for inventory movements.
#[derive(Debug, Clone)]
pub struct InventoryRepository {
    pool: SqlitePool,
}

impl InventoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InventoryRepository { pool }
    }

    /// Appends a movement.
    pub async fn record<'e, X>(executor: X, movement: &InventoryMovement) -> DbResult<()>
    where
        X: Executor<'e, Database = Sqlite>,
    {
        debug!(
            product_id = %movement.product_id,
            kind = %movement.kind,
            quantity = movement.quantity,
            "Recording inventory movement"
        );

        sqlx::query(
            r#"
            INSERT INTO inventory_movements (
                id, product_id, kind, quantity, previous_stock, new_stock,
                reason, reference_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.product_id)
        .bind(movement.kind)
        .bind(movement.quantity)
        .bind(movement.previous_stock)
        .bind(movement.new_stock)
        .bind(&movement.reason)
        .bind(&movement.reference_id)
        .bind(movement.created_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Latest movements for one product, newest first.
    pub async fn list_for_product(
        &self,
        product_id: &str,
        limit: u32,
    ) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(
            r#"
            SELECT id, product_id, kind, quantity, previous_stock, new_stock,
                   reason, reference_id, created_at
            FROM inventory_movements
            WHERE product_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(product_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }

    /// Every movement that references `reference_id` (e.g. an order), in
    /// insertion order.
    pub async fn list_for_reference(&self, reference_id: &str) -> DbResult<Vec<InventoryMovement>> {
        let movements = sqlx::query_as::<_, InventoryMovement>(
            r#"
            SELECT id, product_id, kind, quantity, previous_stock, new_stock,
                   reason, reference_id, created_at
            FROM inventory_movements
            WHERE reference_id = ?1
            ORDER BY rowid ASC
            "#,
        )
        .bind(reference_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::generate_id;
    use crate::repository::product::ProductRepository;
    use crate::{Database, DbConfig};
    use chrono::Utc;
    use tailoc_core::{MovementKind, Product};

    #[tokio::test]
    async fn test_record_and_list() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();
        let product = Product {
            id: generate_id(),
            sku: "KAR-01".to_string(),
            name: "Karaoke mic".to_string(),
            price_cents: 500_000,
            stock: 10,
            reserved: 0,
            low_stock_threshold: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        ProductRepository::insert(db.pool(), &product).await.unwrap();

        for (kind, qty, prev, new) in [(MovementKind::In, 10, 0, 10), (MovementKind::Out, 2, 10, 8)] {
            let movement = InventoryMovement {
                id: generate_id(),
                product_id: product.id.clone(),
                kind,
                quantity: qty,
                previous_stock: prev,
                new_stock: new,
                reason: Some("test".to_string()),
                reference_id: Some("order-1".to_string()),
                created_at: Utc::now(),
            };
            InventoryRepository::record(db.pool(), &movement).await.unwrap();
        }

        let latest = db.inventory().list_for_product(&product.id, 10).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].kind, MovementKind::Out);

        let by_ref = db.inventory().list_for_reference("order-1").await.unwrap();
        assert_eq!(by_ref[0].kind, MovementKind::In);
        assert_eq!(by_ref[1].new_stock, 8);
    }
}
