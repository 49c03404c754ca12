//! Concurrency, expiry and tag invalidation for CacheManager.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tailoc_cache::{
    CacheConfig, CacheKeys, CacheManager, CacheOptions, TAG_PRODUCTS, TAG_PRODUCT_LIST,
};

fn cache() -> CacheManager {
    CacheManager::new(CacheConfig::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_or_compute_runs_compute_once() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(tokio::sync::Barrier::new(16));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        let barrier = Arc::clone(&barrier);
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            cache
                .get_or_compute("product:hot", CacheOptions::new().tag(TAG_PRODUCTS), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, std::convert::Infallible>(vec![1u32, 2, 3])
                })
                .await
        }));
    }

    for handle in handles {
        let value = handle.await.unwrap().unwrap();
        assert_eq!(value, vec![1, 2, 3]);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let metrics = cache.metrics();
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.hits, 15);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn different_keys_compute_independently() {
    let cache = cache();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..8u32 {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute(&CacheKeys::product(&i.to_string()), CacheOptions::new(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, std::convert::Infallible>(i)
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 8);
    assert_eq!(cache.len(), 8);
}

#[tokio::test]
async fn failed_compute_lets_waiter_retry() {
    let cache = cache();

    let first: Result<u32, String> = cache
        .get_or_compute("k", CacheOptions::new(), || async { Err("db down".to_string()) })
        .await;
    assert!(first.is_err());

    let calls = AtomicUsize::new(0);
    let second: Result<u32, String> = cache
        .get_or_compute("k", CacheOptions::new(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(9)
        })
        .await;
    assert_eq!(second, Ok(9));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_entries_are_never_hits() {
    let cache = cache();
    let options = CacheOptions::new().ttl(Duration::from_secs(10));

    cache.set("k", &1u32, options.clone());
    tokio::time::advance(Duration::from_secs(9)).await;
    assert_eq!(cache.get::<u32>("k"), Some(1));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get::<u32>("k"), None);
    assert!(cache.is_empty());

    let recomputed: Result<u32, ()> = cache
        .get_or_compute("k", options, || async { Ok(2) })
        .await;
    assert_eq!(recomputed, Ok(2));
}

#[tokio::test(start_paused = true)]
async fn evict_expired_drops_only_expired() {
    let cache = cache();
    cache.set("short", &1u32, CacheOptions::new().ttl(Duration::from_secs(1)).tag("t"));
    cache.set("long", &2u32, CacheOptions::new().ttl(Duration::from_secs(60)).tag("t"));

    tokio::time::advance(Duration::from_secs(5)).await;
    assert_eq!(cache.evict_expired(), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get::<u32>("long"), Some(2));
    assert_eq!(cache.metrics().evictions, 1);
}

#[tokio::test]
async fn invalidate_products_tag_removes_exactly_tagged_entries() {
    let cache = cache();

    cache.set(
        &CacheKeys::product("p1"),
        &"speaker",
        CacheOptions::new().tags([TAG_PRODUCTS, "product:p1"]),
    );
    cache.set(
        &CacheKeys::product_list(1, 20),
        &vec!["speaker"],
        CacheOptions::new().tags([TAG_PRODUCTS, TAG_PRODUCT_LIST]),
    );
    cache.set(
        &CacheKeys::user_orders("u1"),
        &Vec::<String>::new(),
        CacheOptions::new().tag(CacheKeys::user_orders_tag("u1")),
    );
    cache.set("untagged", &1u32, CacheOptions::new());

    assert_eq!(cache.invalidate_by_tag(TAG_PRODUCTS), 2);

    assert_eq!(cache.get::<String>(&CacheKeys::product("p1")), None);
    assert_eq!(cache.get::<Vec<String>>(&CacheKeys::product_list(1, 20)), None);
    assert_eq!(
        cache.get::<Vec<String>>(&CacheKeys::user_orders("u1")),
        Some(Vec::new())
    );
    assert_eq!(cache.get::<u32>("untagged"), Some(1));

    // Already gone.
    assert_eq!(cache.invalidate_by_tag(TAG_PRODUCTS), 0);
    assert_eq!(cache.metrics().invalidations, 2);
}
