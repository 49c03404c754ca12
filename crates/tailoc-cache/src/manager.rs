//! # Cache Manager
//!
//! Thread-safe TTL cache with tag invalidation and single-flight population.
//!
//! ## Single-Flight Population
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller A ──miss──▶ lock(key) ──▶ re-check ──▶ compute ──▶ store ──┐    │
//! │  caller B ──miss──▶ lock(key) ·········· waits ·················· ▼    │
//! │                                               re-check ──▶ hit (A's)    │
//! │                                                                         │
//! │  The guard map entry is removed by the last holder, so idle keys do    │
//! │  not accumulate mutexes.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invalidate While Computing
//! Before computing, the manager records the generation of every tag the
//! result will carry (plus a global generation bumped by `delete`, `clear`
//! and prefix invalidation). The result is stored first and then the
//! generations are compared again; if any moved, the fresh entry is removed.
//! Either the invalidator sees the entry in the tag index, or the writer sees
//! the bumped generation, so stale data never survives an invalidation.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::metrics::{CacheMetrics, MetricsRecorder};

/// Longest TTL accepted; larger values are clamped.
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// =============================================================================
// Configuration
// =============================================================================

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prepended to every key (`cache:` by default).
    pub key_prefix: String,

    /// TTL used when [`CacheOptions::ttl`] is not set.
    pub default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            key_prefix: "cache:".to_string(),
            default_ttl: Duration::from_secs(60 * 60),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }
}

/// Per-write options.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Time to live. `None` uses the configured default; zero disables
    /// storing.
    pub ttl: Option<Duration>,

    /// Tags for bulk invalidation.
    pub tags: Vec<String>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

// =============================================================================
// Internals
// =============================================================================

struct CacheEntry {
    value: Arc<Value>,
    tags: Box<[String]>,
    expires_at: Instant,
    /// Unique per write, so a rollback never removes a newer entry.
    stamp: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

struct Generations {
    global: u64,
    tags: Vec<(String, u64)>,
}

struct Inner {
    config: CacheConfig,
    entries: DashMap<String, CacheEntry>,
    tag_index: DashMap<String, HashSet<String>>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
    tag_generations: DashMap<String, u64>,
    global_generation: AtomicU64,
    next_stamp: AtomicU64,
    metrics: MetricsRecorder,
}

/// Holds the per-key guard for one computation.
struct FlightPermit<'a> {
    flights: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    lock: Arc<Mutex<()>>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        // Release before checking so a waiter's clone is the only other one.
        self.permit.take();
        let lock = &self.lock;
        // map + self == 2 means nobody else is waiting on this key
        self.flights
            .remove_if(&self.key, |_, v| Arc::ptr_eq(v, lock) && Arc::strong_count(v) <= 2);
    }
}

// =============================================================================
// Cache Manager
// =============================================================================

/// In-memory cache-aside store. Cloning is cheap and shares the store.
#[derive(Clone)]
pub struct CacheManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.inner.config)
            .field("entries", &self.inner.entries.len())
            .finish()
    }
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        CacheManager {
            inner: Arc::new(Inner {
                config,
                entries: DashMap::new(),
                tag_index: DashMap::new(),
                in_flight: DashMap::new(),
                tag_generations: DashMap::new(),
                global_generation: AtomicU64::new(0),
                next_stamp: AtomicU64::new(0),
                metrics: MetricsRecorder::default(),
            }),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Returns the cached value or computes, stores and returns it.
    ///
    /// ## Behavior
    /// - Hit: the stored value is returned, `compute` is not called.
    /// - Miss: the per-key guard is taken, the cache is checked again, then
    ///   `compute` runs. Concurrent callers for the same key wait on the
    ///   guard and are served the stored result.
    /// - `compute` errors are returned as-is and nothing is stored.
    /// - A value that cannot be serialized is returned without being stored.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        options: CacheOptions,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let full_key = self.full_key(key);

        if let Some(value) = self.lookup::<T>(&full_key) {
            self.inner.metrics.hit();
            debug!(key = %full_key, "Cache hit");
            return Ok(value);
        }

        let _flight = self.acquire(&full_key).await;

        if let Some(value) = self.lookup::<T>(&full_key) {
            self.inner.metrics.hit();
            debug!(key = %full_key, "Cache hit after waiting for in-flight compute");
            return Ok(value);
        }

        self.inner.metrics.miss();
        debug!(key = %full_key, "Cache miss, computing");

        let generations = self.generations(&options.tags);
        let value = compute().await?;

        match serde_json::to_value(&value) {
            Ok(json) => {
                self.store(full_key, json, &options, Some(&generations));
            }
            Err(e) => {
                warn!(key = %full_key, error = %e, "Value not serializable, returning uncached");
            }
        }

        Ok(value)
    }

    /// Reads a value without computing.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let full_key = self.full_key(key);
        let value = self.lookup::<T>(&full_key);
        match value {
            Some(_) => self.inner.metrics.hit(),
            None => self.inner.metrics.miss(),
        }
        value
    }

    /// Stores a value. Returns `false` when the value could not be
    /// serialized or the TTL is zero.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, options: CacheOptions) -> bool {
        let full_key = self.full_key(key);
        match serde_json::to_value(value) {
            Ok(json) => self.store(full_key, json, &options, None),
            Err(e) => {
                warn!(key = %full_key, error = %e, "Value not serializable, not cached");
                false
            }
        }
    }

    /// Removes one key. Returns whether an entry existed.
    pub fn delete(&self, key: &str) -> bool {
        let full_key = self.full_key(key);
        self.inner.global_generation.fetch_add(1, Ordering::SeqCst);

        let existed = self.inner.entries.remove(&full_key).is_some();
        if existed {
            self.inner.metrics.delete();
            debug!(key = %full_key, "Cache delete");
        }
        existed
    }

    /// Removes every entry whose tag set contains `tag`. Returns the count.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        // Bump first: a concurrent compute either sees the new generation or
        // is already listed in the index removed below.
        *self
            .inner
            .tag_generations
            .entry(tag.to_string())
            .or_insert(0) += 1;

        let Some((_, keys)) = self.inner.tag_index.remove(tag) else {
            debug!(tag, removed = 0, "Invalidated cache tag");
            return 0;
        };

        // The index may list keys that were since rewritten with other tags.
        let removed = keys
            .iter()
            .filter(|key| {
                self.inner
                    .entries
                    .remove_if(key.as_str(), |_, entry| entry.has_tag(tag))
                    .is_some()
            })
            .count();

        self.inner.metrics.invalidated(removed);
        debug!(tag, removed, "Invalidated cache tag");
        removed
    }

    /// Removes every key starting with `prefix` (the key prefix is applied).
    pub fn invalidate_by_prefix(&self, prefix: &str) -> usize {
        let full_prefix = self.full_key(prefix);
        self.inner.global_generation.fetch_add(1, Ordering::SeqCst);

        let mut removed = 0;
        self.inner.entries.retain(|key, _| {
            let keep = !key.starts_with(&full_prefix);
            if !keep {
                removed += 1;
            }
            keep
        });

        self.inner.metrics.invalidated(removed);
        debug!(prefix = %full_prefix, removed, "Invalidated cache prefix");
        removed
    }

    /// Removes everything. Returns the number of entries dropped.
    pub fn clear(&self) -> usize {
        self.inner.global_generation.fetch_add(1, Ordering::SeqCst);

        let removed = self.inner.entries.len();
        self.inner.entries.clear();
        self.inner.tag_index.clear();

        self.inner.metrics.invalidated(removed);
        debug!(removed, "Cache cleared");
        removed
    }

    /// Drops expired entries and prunes the tag index.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut evicted = 0;
        self.inner.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                evicted += 1;
            }
            keep
        });

        let entries = &self.inner.entries;
        self.inner.tag_index.retain(|_, keys| {
            keys.retain(|key| entries.contains_key(key));
            !keys.is_empty()
        });

        self.inner.metrics.evicted(evicted);
        if evicted > 0 {
            debug!(evicted, "Evicted expired cache entries");
        }
        evicted
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.inner.metrics.snapshot()
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.inner.config.key_prefix, key)
    }

    async fn acquire(&self, full_key: &str) -> FlightPermit<'_> {
        let lock = Arc::clone(
            self.inner
                .in_flight
                .entry(full_key.to_string())
                .or_default()
                .value(),
        );
        let permit = Arc::clone(&lock).lock_owned().await;

        FlightPermit {
            flights: &self.inner.in_flight,
            key: full_key.to_string(),
            lock,
            permit: Some(permit),
        }
    }

    fn lookup<T: DeserializeOwned>(&self, full_key: &str) -> Option<T> {
        let value = self.lookup_raw(full_key)?;
        match T::deserialize(value.as_ref()) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(key = %full_key, error = %e, "Cached value has unexpected shape, treating as miss");
                None
            }
        }
    }

    fn lookup_raw(&self, full_key: &str) -> Option<Arc<Value>> {
        let now = Instant::now();
        let entry = self.inner.entries.get(full_key)?;
        if !entry.is_expired(now) {
            return Some(Arc::clone(&entry.value));
        }

        // Drop the read guard before removing.
        drop(entry);
        if self
            .inner
            .entries
            .remove_if(full_key, |_, entry| entry.is_expired(now))
            .is_some()
        {
            self.inner.metrics.evicted(1);
        }
        None
    }

    fn store(
        &self,
        full_key: String,
        value: Value,
        options: &CacheOptions,
        generations: Option<&Generations>,
    ) -> bool {
        let ttl = options
            .ttl
            .unwrap_or(self.inner.config.default_ttl)
            .min(MAX_TTL);
        if ttl.is_zero() {
            return false;
        }

        let stamp = self.inner.next_stamp.fetch_add(1, Ordering::SeqCst);
        self.inner.entries.insert(
            full_key.clone(),
            CacheEntry {
                value: Arc::new(value),
                tags: options.tags.clone().into_boxed_slice(),
                expires_at: Instant::now() + ttl,
                stamp,
            },
        );
        for tag in &options.tags {
            self.inner
                .tag_index
                .entry(tag.clone())
                .or_default()
                .insert(full_key.clone());
        }

        if let Some(generations) = generations {
            if !self.is_current(generations) {
                self.inner
                    .entries
                    .remove_if(&full_key, |_, entry| entry.stamp == stamp);
                self.inner.metrics.discard();
                debug!(key = %full_key, "Invalidated while computing, result not cached");
                return false;
            }
        }

        self.inner.metrics.set();
        debug!(key = %full_key, ttl_secs = ttl.as_secs(), tags = ?options.tags, "Cache set");
        true
    }

    fn tag_generation(&self, tag: &str) -> u64 {
        self.inner
            .tag_generations
            .get(tag)
            .map(|generation| *generation)
            .unwrap_or(0)
    }

    fn generations(&self, tags: &[String]) -> Generations {
        Generations {
            global: self.inner.global_generation.load(Ordering::SeqCst),
            tags: tags
                .iter()
                .map(|tag| (tag.clone(), self.tag_generation(tag)))
                .collect(),
        }
    }

    fn is_current(&self, generations: &Generations) -> bool {
        generations.global == self.inner.global_generation.load(Ordering::SeqCst)
            && generations
                .tags
                .iter()
                .all(|(tag, seen)| self.tag_generation(tag) == *seen)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
