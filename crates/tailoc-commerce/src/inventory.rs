//! # Inventory Ledger
//!
//! Stock and reservation changes, each one a transaction that updates the
//! product counters and appends a movement.
//!
//! ## Counters
//! ```text
//!   stock ──────────────────────────────┐
//!   ├── reserved (held for checkout)    │   available = stock - reserved
//!   └── available (sellable now)        │   invariant: available >= 0
//!                                       ┘
//!
//!   adjust(+n)   stock    += n            movement 'in'
//!   adjust(-n)   stock    -= n            movement 'out'   (n <= available)
//!   reserve(n)   reserved += n            movement 'reserved' (n <= available)
//!   release(n)   reserved -= n            movement 'unreserved' (n <= reserved)
//! ```
//!
//! ## After Commit
//! 1. Drop cached reads of the product (`product:{id}` tag), product
//!    listings and low-stock listings.
//! 2. Publish `StockAdjusted`, plus `LowStock` when stock is at or below a
//!    non-zero threshold.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::info;

use tailoc_cache::{CacheKeys, CacheManager, CacheOptions, TAG_INVENTORY, TAG_PRODUCT_LIST};
use tailoc_core::validation::{
    validate_non_negative, validate_quantity, validate_reason, validate_stock_delta,
};
use tailoc_core::{InventoryLevel, InventoryMovement, MovementKind, Product};
use tailoc_db::repository::generate_id;
use tailoc_db::{InventoryRepository, ProductRepository};

use crate::context::CommerceContext;
use crate::error::{CommerceError, CommerceResult};
use crate::events::{DomainEvent, EventBus};

// =============================================================================
// Stock Change
// =============================================================================

/// One counter change, applied inside a caller's transaction.
#[derive(Debug, Clone)]
pub(crate) struct StockChange {
    pub product_id: String,
    pub kind: MovementKind,
    /// Always positive.
    pub quantity: i64,
    pub reason: Option<String>,
    pub reference_id: Option<String>,
}

/// Result of a committed [`StockChange`].
#[derive(Debug, Clone)]
pub(crate) struct AppliedChange {
    pub product: Product,
    pub movement: InventoryMovement,
}

impl StockChange {
    /// Updates the counter with a guarded statement, then records the
    /// movement on the same connection.
    pub(crate) async fn apply(
        &self,
        conn: &mut SqliteConnection,
        now: DateTime<Utc>,
    ) -> CommerceResult<AppliedChange> {
        let id = self.product_id.as_str();
        let qty = self.quantity;

        let accepted = match self.kind {
            MovementKind::In => ProductRepository::adjust_stock(&mut *conn, id, qty, now).await?,
            MovementKind::Out => ProductRepository::adjust_stock(&mut *conn, id, -qty, now).await?,
            MovementKind::Reserved => {
                ProductRepository::adjust_reserved(&mut *conn, id, qty, now).await?
            }
            MovementKind::Unreserved => {
                ProductRepository::adjust_reserved(&mut *conn, id, -qty, now).await?
            }
        };

        let product = ProductRepository::fetch_by_id(&mut *conn, id)
            .await?
            .ok_or_else(|| CommerceError::ProductNotFound(id.to_string()))?;

        if accepted.is_none() {
            return Err(self.rejection(&product));
        }

        let previous_stock = match self.kind {
            MovementKind::In => product.stock - qty,
            MovementKind::Out => product.stock + qty,
            MovementKind::Reserved | MovementKind::Unreserved => product.stock,
        };

        let movement = InventoryMovement {
            id: generate_id(),
            product_id: product.id.clone(),
            kind: self.kind,
            quantity: qty,
            previous_stock,
            new_stock: product.stock,
            reason: self.reason.clone(),
            reference_id: self.reference_id.clone(),
            created_at: now,
        };
        InventoryRepository::record(&mut *conn, &movement).await?;

        Ok(AppliedChange { product, movement })
    }

    fn rejection(&self, product: &Product) -> CommerceError {
        match self.kind {
            MovementKind::Unreserved => CommerceError::InsufficientReserved {
                product_id: product.id.clone(),
                reserved: product.reserved,
                requested: self.quantity,
            },
            _ => CommerceError::InsufficientStock {
                product_id: product.id.clone(),
                available: product.available(),
                requested: self.quantity,
            },
        }
    }
}

impl AppliedChange {
    pub(crate) fn events(&self) -> Vec<DomainEvent> {
        let mut events = vec![DomainEvent::StockAdjusted {
            product_id: self.product.id.clone(),
            kind: self.movement.kind,
            quantity: self.movement.quantity,
            previous_stock: self.movement.previous_stock,
            new_stock: self.movement.new_stock,
            reserved: self.product.reserved,
            reference_id: self.movement.reference_id.clone(),
        }];

        if self.product.is_low_stock() {
            events.push(DomainEvent::LowStock {
                product_id: self.product.id.clone(),
                sku: self.product.sku.clone(),
                stock: self.product.stock,
                threshold: self.product.low_stock_threshold,
            });
        }

        events
    }
}

/// Drops every cached read that shows the stock of `product_id`.
pub(crate) fn invalidate_stock(cache: &CacheManager, product_id: &str) {
    cache.invalidate_by_tag(&CacheKeys::product_tag(product_id));
    cache.invalidate_by_tag(TAG_PRODUCT_LIST);
    cache.invalidate_by_prefix(CacheKeys::low_stock_prefix());
}

// =============================================================================
// Inventory Ledger
// =============================================================================

/// Stock levels, reservations and the movement history.
#[derive(Debug, Clone)]
pub struct InventoryLedger {
    ctx: CommerceContext,
}

impl InventoryLedger {
    pub fn new(ctx: CommerceContext) -> Self {
        InventoryLedger { ctx }
    }

    /// Adds (`delta > 0`) or removes (`delta < 0`) physical stock.
    ///
    /// ## Errors
    /// - `Validation` for a zero or out-of-range delta, or an over-long reason
    /// - `ProductNotFound`
    /// - `InsufficientStock` when the removal would leave stock below the
    ///   reserved quantity
    pub async fn adjust(
        &self,
        product_id: &str,
        delta: i64,
        reason: &str,
    ) -> CommerceResult<InventoryLevel> {
        validate_stock_delta(delta)?;
        validate_reason(reason)?;

        let kind = if delta > 0 {
            MovementKind::In
        } else {
            MovementKind::Out
        };

        self.run(
            "inventory.adjust",
            StockChange {
                product_id: product_id.to_string(),
                kind,
                quantity: delta.saturating_abs(),
                reason: non_empty(reason),
                reference_id: None,
            },
        )
        .await
    }

    /// Holds `quantity` units out of the available stock.
    pub async fn reserve(
        &self,
        product_id: &str,
        quantity: i64,
        reference_id: Option<&str>,
    ) -> CommerceResult<InventoryLevel> {
        validate_quantity(quantity)?;

        self.run(
            "inventory.reserve",
            StockChange {
                product_id: product_id.to_string(),
                kind: MovementKind::Reserved,
                quantity,
                reason: None,
                reference_id: reference_id.map(str::to_string),
            },
        )
        .await
    }

    /// Returns previously reserved units to the available stock.
    pub async fn release(
        &self,
        product_id: &str,
        quantity: i64,
        reference_id: Option<&str>,
    ) -> CommerceResult<InventoryLevel> {
        validate_quantity(quantity)?;

        self.run(
            "inventory.release",
            StockChange {
                product_id: product_id.to_string(),
                kind: MovementKind::Unreserved,
                quantity,
                reason: None,
                reference_id: reference_id.map(str::to_string),
            },
        )
        .await
    }

    /// Current counters of one product (cached).
    pub async fn level(&self, product_id: &str) -> CommerceResult<InventoryLevel> {
        let options = CacheOptions::new()
            .ttl(self.ctx.config().cache.inventory_ttl())
            .tags([TAG_INVENTORY.to_string(), CacheKeys::product_tag(product_id)]);

        let products = self.ctx.database().products();
        self.ctx
            .cache()
            .get_or_compute(&CacheKeys::inventory(product_id), options, || async {
                let product = products
                    .get_by_id(product_id)
                    .await?
                    .ok_or_else(|| CommerceError::ProductNotFound(product_id.to_string()))?;
                Ok::<_, CommerceError>(InventoryLevel::from(&product))
            })
            .await
    }

    /// Active products at or below their threshold, lowest stock first
    /// (cached).
    pub async fn low_stock(&self, limit: u32) -> CommerceResult<Vec<InventoryLevel>> {
        let options = CacheOptions::new()
            .ttl(self.ctx.config().cache.inventory_ttl())
            .tag(TAG_INVENTORY);

        let products = self.ctx.database().products();
        self.ctx
            .cache()
            .get_or_compute(&CacheKeys::low_stock(limit), options, || async {
                let low = products.low_stock(limit).await?;
                Ok::<_, CommerceError>(low.iter().map(InventoryLevel::from).collect())
            })
            .await
    }

    /// Sets the low-stock threshold. Zero disables alerts.
    pub async fn set_low_stock_threshold(
        &self,
        product_id: &str,
        threshold: i64,
    ) -> CommerceResult<()> {
        validate_non_negative("low_stock_threshold", threshold)?;

        self.ctx
            .database()
            .products()
            .set_low_stock_threshold(product_id, threshold, Utc::now())
            .await
            .map_err(|e| not_found_as_product(e, product_id))?;

        invalidate_stock(self.ctx.cache(), product_id);
        info!(product_id = %product_id, threshold, "Low stock threshold updated");
        Ok(())
    }

    /// Latest movements of one product, newest first.
    pub async fn movements(
        &self,
        product_id: &str,
        limit: u32,
    ) -> CommerceResult<Vec<InventoryMovement>> {
        Ok(self
            .ctx
            .database()
            .inventory()
            .list_for_product(product_id, limit)
            .await?)
    }

    async fn run(&self, name: &str, change: StockChange) -> CommerceResult<InventoryLevel> {
        let transactions = self.ctx.transactions();
        let outcome = transactions
            .execute(name, transactions.defaults(), |conn| {
                let change = change.clone();
                Box::pin(async move { change.apply(conn, Utc::now()).await })
            })
            .await;

        let applied = outcome.into_result()?;

        invalidate_stock(self.ctx.cache(), &applied.product.id);
        publish(self.ctx.events(), &applied);

        info!(
            product_id = %applied.product.id,
            kind = %applied.movement.kind,
            quantity = applied.movement.quantity,
            stock = applied.product.stock,
            reserved = applied.product.reserved,
            "Inventory updated"
        );

        Ok(InventoryLevel::from(&applied.product))
    }
}

fn publish(events: &EventBus, applied: &AppliedChange) {
    events.publish_all(applied.events());
}

fn non_empty(reason: &str) -> Option<String> {
    let trimmed = reason.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub(crate) fn not_found_as_product(err: tailoc_db::DbError, product_id: &str) -> CommerceError {
    match err {
        tailoc_db::DbError::NotFound { .. } => CommerceError::ProductNotFound(product_id.to_string()),
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommerceConfig;
    use tailoc_core::NewProduct;

    async fn setup(stock: i64) -> (CommerceContext, String) {
        let ctx = CommerceContext::connect(CommerceConfig::in_memory()).await.unwrap();
        let product = ctx
            .catalog()
            .create_product(NewProduct {
                sku: "SPK-001".to_string(),
                name: "JBL Pasion 12".to_string(),
                price_cents: 1_250_000_000,
                initial_stock: stock,
                low_stock_threshold: 2,
            })
            .await
            .unwrap();
        (ctx, product.id)
    }

    #[tokio::test]
    async fn test_adjust_in_and_out() {
        let (ctx, id) = setup(5).await;
        let ledger = ctx.inventory();

        let level = ledger.adjust(&id, 3, "delivery").await.unwrap();
        assert_eq!(level.stock, 8);

        let level = ledger.adjust(&id, -6, "damaged").await.unwrap();
        assert_eq!(level.stock, 2);
        assert!(level.is_low_stock);

        let movements = ledger.movements(&id, 10).await.unwrap();
        assert_eq!(movements[0].kind, MovementKind::Out);
        assert_eq!(movements[0].previous_stock, 8);
        assert_eq!(movements[0].new_stock, 2);
        assert_eq!(movements[0].reason.as_deref(), Some("damaged"));
    }

    #[tokio::test]
    async fn test_adjust_rejects_overdraw() {
        let (ctx, id) = setup(5).await;
        let ledger = ctx.inventory();

        let err = ledger.adjust(&id, -6, "").await.unwrap_err();
        assert!(matches!(
            err,
            CommerceError::InsufficientStock { available: 5, requested: 6, .. }
        ));
        assert_eq!(ledger.level(&id).await.unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_adjust_validation_and_missing_product() {
        let (ctx, id) = setup(5).await;
        let ledger = ctx.inventory();

        assert!(matches!(
            ledger.adjust(&id, 0, "").await.unwrap_err(),
            CommerceError::Validation(_)
        ));
        assert!(matches!(
            ledger.adjust(&id, i64::MAX, "").await.unwrap_err(),
            CommerceError::Validation(_)
        ));
        assert!(matches!(
            ledger.adjust(&id, i64::MIN, "").await.unwrap_err(),
            CommerceError::Validation(_)
        ));
        assert_eq!(ledger.level(&id).await.unwrap().stock, 5);
        assert!(matches!(
            ledger.adjust("no-such-product", 1, "").await.unwrap_err(),
            CommerceError::ProductNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_reserve_protects_available() {
        let (ctx, id) = setup(5).await;
        let ledger = ctx.inventory();

        let level = ledger.reserve(&id, 4, Some("cart-1")).await.unwrap();
        assert_eq!(level.reserved, 4);
        assert_eq!(level.available, 1);

        // Stock may not drop below what is reserved.
        assert!(matches!(
            ledger.adjust(&id, -2, "").await.unwrap_err(),
            CommerceError::InsufficientStock { available: 1, requested: 2, .. }
        ));
        assert!(matches!(
            ledger.reserve(&id, 2, None).await.unwrap_err(),
            CommerceError::InsufficientStock { .. }
        ));

        assert!(matches!(
            ledger.release(&id, 5, None).await.unwrap_err(),
            CommerceError::InsufficientReserved { reserved: 4, requested: 5, .. }
        ));
        let level = ledger.release(&id, 4, Some("cart-1")).await.unwrap();
        assert_eq!(level.available, 5);
    }

    #[tokio::test]
    async fn test_level_cache_is_invalidated_by_adjust() {
        let (ctx, id) = setup(5).await;
        let ledger = ctx.inventory();

        assert_eq!(ledger.level(&id).await.unwrap().stock, 5);
        assert_eq!(ledger.level(&id).await.unwrap().stock, 5);
        assert_eq!(ctx.cache().metrics().hits, 1);

        ledger.adjust(&id, 2, "").await.unwrap();
        assert_eq!(ledger.level(&id).await.unwrap().stock, 7);
    }

    #[tokio::test]
    async fn test_events_published_after_commit() {
        let (ctx, id) = setup(3).await;
        let mut rx = ctx.events().subscribe();

        ctx.inventory().adjust(&id, -1, "sold in store").await.unwrap();

        match rx.recv().await.unwrap() {
            DomainEvent::StockAdjusted { kind, new_stock, .. } => {
                assert_eq!(kind, MovementKind::Out);
                assert_eq!(new_stock, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(rx.recv().await.unwrap(), DomainEvent::LowStock { stock: 2, .. }));

        // Rejected changes publish nothing.
        ctx.inventory().adjust(&id, -10, "").await.unwrap_err();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_low_stock_listing() {
        let (ctx, id) = setup(5).await;
        let ledger = ctx.inventory();

        assert!(ledger.low_stock(10).await.unwrap().is_empty());

        ledger.adjust(&id, -4, "").await.unwrap();
        let low = ledger.low_stock(10).await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].stock, 1);

        ledger.set_low_stock_threshold(&id, 0).await.unwrap();
        assert!(ledger.low_stock(10).await.unwrap().is_empty());
    }
}
