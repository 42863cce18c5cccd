use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time hit/miss figures for a caching layer.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CacheStats {
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups resolved through the wrapped collection.
    pub misses: u64,
    /// Hits plus misses.
    pub lookups: u64,
    /// Share of lookups that hit, `0.0` before any lookup.
    pub hit_ratio: f64,
}

/// Compute cache statistics from raw hit and miss counts.
pub fn cache_stats(hits: u64, misses: u64) -> CacheStats {
    let lookups = hits.saturating_add(misses);
    let hit_ratio = if lookups == 0 {
        0.0
    } else {
        hits as f64 / lookups as f64
    };
    CacheStats {
        hits,
        misses,
        lookups,
        hit_ratio,
    }
}

/// Lock-free hit/miss counters shared by views over one cache.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheCounters {
    /// Count one cache hit.
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one cache miss.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters.
    pub fn snapshot(&self) -> CacheStats {
        cache_stats(
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_stats_reports_ratio() {
        let stats = cache_stats(3, 1);
        assert_eq!(stats.lookups, 4);
        assert!((stats.hit_ratio - 0.75).abs() < 1e-6);
    }

    #[test]
    fn cache_stats_handles_no_lookups() {
        let stats = cache_stats(0, 0);
        assert_eq!(stats.lookups, 0);
        assert_eq!(stats.hit_ratio, 0.0);
    }

    #[test]
    fn counters_accumulate() {
        let counters = CacheCounters::default();
        counters.record_miss();
        counters.record_hit();
        counters.record_hit();
        let stats = counters.snapshot();
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }
}
