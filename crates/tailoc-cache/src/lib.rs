//! # tailoc-cache: TTL and Tag Cache
//!
//! In-memory cache-aside store used by the catalogue, inventory and order
//! services.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          CacheManager                                   │
//! │                                                                         │
//! │   entries     DashMap<key, CacheEntry{ value, tags, expires_at }>       │
//! │   tag_index   DashMap<tag, {key}>                                       │
//! │   in_flight   DashMap<key, Arc<Mutex<()>>>   (one compute per key)      │
//! │   generations DashMap<tag, u64> + global     (invalidate-while-compute) │
//! │                                                                         │
//! │   get_or_compute("cache:product:42", tags=["products","product:42"])    │
//! │        │                                                                │
//! │        ├── hit, not expired ─────────────────────▶ value                │
//! │        │                                                                │
//! │        └── miss ──▶ lock key ──▶ re-check ──▶ compute ──▶ store          │
//! │                                                   │                     │
//! │                    Err(e) is returned, never cached                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - An expired entry is never returned as a hit; it is evicted on access.
//! - Concurrent `get_or_compute` calls for one key run `compute` once.
//! - `invalidate_by_tag(t)` removes exactly the entries whose tag set
//!   contains `t`.
//! - A value whose tags were invalidated while it was being computed is
//!   returned to its caller but not stored.
//!
//! ## Example
//! ```rust
//! use tailoc_cache::{CacheConfig, CacheManager, CacheOptions};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let cache = CacheManager::new(CacheConfig::default());
//! let options = CacheOptions::new().tag("products");
//!
//! let value: Result<u32, std::convert::Infallible> =
//!     cache.get_or_compute("answer", options, || async { Ok(42) }).await;
//! assert_eq!(value.unwrap(), 42);
//! assert_eq!(cache.invalidate_by_tag("products"), 1);
//! # }
//! ```

pub mod keys;
pub mod manager;
pub mod metrics;

pub use keys::{CacheKeys, TAG_INVENTORY, TAG_PRODUCTS, TAG_PRODUCT_LIST};
pub use manager::{CacheConfig, CacheManager, CacheOptions};
pub use metrics::CacheMetrics;
