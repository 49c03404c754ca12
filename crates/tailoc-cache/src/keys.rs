//! # Cache Keys and Tags
//!
//! Every key and tag the services use is built here so that writers and
//! invalidators agree on the exact strings.
//!
//! ```text
//! Key                          Tags
//! ───────────────────────────  ─────────────────────────────────────────
//! product:{id}                 products, product:{id}
//! products:list:{page}:{size}  products, product-list
//! inventory:{id}               inventory, product:{id}
//! inventory:low:{limit}        inventory
//! orders:{user}                user:{user}:orders
//! ```
//!
//! Keys are stored with the configured prefix (`cache:` by default). Tags are
//! never prefixed.

/// Tag carried by every product-derived entry.
pub const TAG_PRODUCTS: &str = "products";

/// Tag carried by paginated product listings.
pub const TAG_PRODUCT_LIST: &str = "product-list";

/// Tag carried by stock read models.
pub const TAG_INVENTORY: &str = "inventory";

/// Key and tag builder.
pub struct CacheKeys;

impl CacheKeys {
    pub fn product(id: &str) -> String {
        format!("product:{id}")
    }

    pub fn product_list(page: u32, page_size: u32) -> String {
        format!("products:list:{page}:{page_size}")
    }

    pub fn inventory(product_id: &str) -> String {
        format!("inventory:{product_id}")
    }

    pub fn low_stock(limit: u32) -> String {
        format!("{}{limit}", Self::low_stock_prefix())
    }

    /// Common prefix of every low-stock listing, for prefix invalidation.
    pub const fn low_stock_prefix() -> &'static str {
        "inventory:low:"
    }

    pub fn user_orders(user_id: &str) -> String {
        format!("orders:{user_id}")
    }

    /// Tag shared by every entry derived from one product.
    pub fn product_tag(id: &str) -> String {
        format!("product:{id}")
    }

    /// Tag for a user's order history.
    pub fn user_orders_tag(user_id: &str) -> String {
        format!("user:{user_id}:orders")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(CacheKeys::product("p1"), "product:p1");
        assert_eq!(CacheKeys::product_list(2, 20), "products:list:2:20");
        assert_eq!(CacheKeys::user_orders("u1"), "orders:u1");
        assert_eq!(CacheKeys::low_stock(10), "inventory:low:10");
        assert!(!CacheKeys::inventory("p1").starts_with(CacheKeys::low_stock_prefix()));
        assert_eq!(CacheKeys::user_orders_tag("u1"), "user:u1:orders");
    }
}
