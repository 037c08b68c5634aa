//! Cache usage statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics about one namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads answered from the entity cache.
    pub hits: u64,
    /// Reads that had to issue a remote fetch.
    pub misses: u64,
    /// Reads that joined a fetch already in flight.
    pub coalesced: u64,
    /// Remote calls issued (a batch counts once).
    pub fetches: u64,
    /// Fetches that settled with an error, per key.
    pub failures: u64,
    /// Number of entries currently cached.
    pub entry_count: u64,
    /// Number of fetches currently in flight.
    pub pending_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0). Coalesced reads count as hits.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.coalesced + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits + self.coalesced) as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub coalesced: AtomicU64,
    pub fetches: AtomicU64,
    pub failures: AtomicU64,
}

impl Counters {
    pub fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self, entry_count: usize, pending_count: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            fetches: self.fetches.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            entry_count: entry_count as u64,
            pending_count: pending_count as u64,
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.coalesced,
            &self.fetches,
            &self.failures,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 70,
            coalesced: 10,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_counters_snapshot_and_reset() {
        let counters = Counters::default();
        Counters::bump(&counters.hits, 3);
        Counters::bump(&counters.failures, 1);
        let stats = counters.snapshot(2, 1);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.entry_count, 2);
        assert_eq!(stats.pending_count, 1);

        counters.reset();
        assert_eq!(counters.snapshot(0, 0), CacheStats::default());
    }
}
