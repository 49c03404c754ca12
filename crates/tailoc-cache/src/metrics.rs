//! Cache counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries removed by tag, prefix or clear.
    pub invalidations: u64,
    /// Expired entries dropped on access or by `evict_expired`.
    pub evictions: u64,
    /// Computations whose result was not stored because a tag was
    /// invalidated while they ran.
    pub discarded: u64,
}

impl CacheMetrics {
    /// Hit rate in percent, 0 when nothing was looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64 * 100.0
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MetricsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    invalidations: AtomicU64,
    evictions: AtomicU64,
    discarded: AtomicU64,
}

impl MetricsRecorder {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn invalidated(&self, count: usize) {
        self.invalidations.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn evicted(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn discard(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheMetrics {
        CacheMetrics {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        assert_eq!(CacheMetrics::default().hit_rate(), 0.0);

        let recorder = MetricsRecorder::default();
        recorder.hit();
        recorder.hit();
        recorder.hit();
        recorder.miss();
        assert_eq!(recorder.snapshot().hit_rate(), 75.0);
    }
}
