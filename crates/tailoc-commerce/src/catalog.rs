//! # Product Catalog
//!
//! Product creation, cached reads and soft deletion.
//!
//! ```text
//! get_product(id)        key product:{id}              tags products, product:{id}
//! list_products(p, s)    key products:list:{p}:{s}     tags products, product-list
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use tailoc_cache::{CacheKeys, CacheOptions, TAG_PRODUCTS, TAG_PRODUCT_LIST};
use tailoc_core::validation::{validate_new_product, validate_uuid};
use tailoc_core::{InventoryMovement, MovementKind, NewProduct, Product};
use tailoc_db::repository::generate_id;
use tailoc_db::{DbError, InventoryRepository, ProductRepository};

use crate::context::CommerceContext;
use crate::error::{CommerceError, CommerceResult};
use crate::inventory::{invalidate_stock, not_found_as_product};

/// Largest page a listing may request.
pub const MAX_PAGE_SIZE: u32 = 100;

/// One page of active products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
}

#[derive(Debug, Clone)]
pub struct ProductCatalog {
    ctx: CommerceContext,
}

impl ProductCatalog {
    pub fn new(ctx: CommerceContext) -> Self {
        ProductCatalog { ctx }
    }

    /// Creates a product. Non-zero initial stock is recorded as an `in`
    /// movement in the same transaction.
    pub async fn create_product(&self, input: NewProduct) -> CommerceResult<Product> {
        validate_new_product(&input)?;

        let now = Utc::now();
        let product = Product {
            id: generate_id(),
            sku: input.sku.trim().to_string(),
            name: input.name.trim().to_string(),
            price_cents: input.price_cents,
            stock: input.initial_stock,
            reserved: 0,
            low_stock_threshold: input.low_stock_threshold,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        let transactions = self.ctx.transactions();
        let outcome = transactions
            .execute("catalog.create_product", transactions.defaults(), |conn| {
                let product = product.clone();
                Box::pin(async move {
                    ProductRepository::insert(&mut *conn, &product)
                        .await
                        .map_err(|e| match e {
                            DbError::UniqueViolation { value, .. } => {
                                CommerceError::DuplicateSku(value)
                            }
                            other => other.into(),
                        })?;

                    if product.stock > 0 {
                        let movement = InventoryMovement {
                            id: generate_id(),
                            product_id: product.id.clone(),
                            kind: MovementKind::In,
                            quantity: product.stock,
                            previous_stock: 0,
                            new_stock: product.stock,
                            reason: Some("opening stock".to_string()),
                            reference_id: None,
                            created_at: product.created_at,
                        };
                        InventoryRepository::record(&mut *conn, &movement).await?;
                    }

                    Ok::<_, CommerceError>(())
                })
            })
            .await;
        outcome.into_result()?;

        self.ctx.cache().invalidate_by_tag(TAG_PRODUCT_LIST);
        info!(id = %product.id, sku = %product.sku, stock = product.stock, "Product created");
        Ok(product)
    }

    /// Gets a product by ID (cached).
    pub async fn get_product(&self, id: &str) -> CommerceResult<Product> {
        let options = CacheOptions::new()
            .ttl(self.ctx.config().cache.product_ttl())
            .tags([TAG_PRODUCTS.to_string(), CacheKeys::product_tag(id)]);

        let products = self.ctx.database().products();
        self.ctx
            .cache()
            .get_or_compute(&CacheKeys::product(id), options, || async {
                products
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| CommerceError::ProductNotFound(id.to_string()))
            })
            .await
    }

    /// Looks up a product by SKU, bypassing the cache.
    pub async fn find_by_sku(&self, sku: &str) -> CommerceResult<Product> {
        self.ctx
            .database()
            .products()
            .get_by_sku(sku.trim())
            .await?
            .ok_or_else(|| CommerceError::ProductNotFound(sku.to_string()))
    }

    /// Accepts either a product ID or a SKU.
    pub async fn resolve(&self, id_or_sku: &str) -> CommerceResult<Product> {
        if validate_uuid(id_or_sku).is_ok() {
            self.get_product(id_or_sku).await
        } else {
            self.find_by_sku(id_or_sku).await
        }
    }

    /// Lists active products ordered by name (cached).
    ///
    /// `page` is 1-based (0 is treated as 1); `page_size` is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    pub async fn list_products(&self, page: u32, page_size: u32) -> CommerceResult<ProductPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(page_size);

        let options = CacheOptions::new()
            .ttl(self.ctx.config().cache.product_list_ttl())
            .tags([TAG_PRODUCTS, TAG_PRODUCT_LIST]);

        let products = self.ctx.database().products();
        self.ctx
            .cache()
            .get_or_compute(&CacheKeys::product_list(page, page_size), options, || async {
                let items = products.list_active(page_size, offset).await?;
                let total = products.count_active().await?;
                Ok::<_, CommerceError>(ProductPage {
                    items,
                    page,
                    page_size,
                    total,
                })
            })
            .await
    }

    /// Hides a product from listings and new orders. Past orders keep it.
    pub async fn deactivate_product(&self, id: &str) -> CommerceResult<()> {
        self.ctx
            .database()
            .products()
            .deactivate(id, Utc::now())
            .await
            .map_err(|e| not_found_as_product(e, id))?;

        invalidate_stock(self.ctx.cache(), id);
        info!(id = %id, "Product deactivated");
        Ok(())
    }
}
