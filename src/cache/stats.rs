//! Cache Statistics Module
//!
//! Snapshot of cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Point-in-time cache metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of `get` calls that found their key
    pub hits: u64,
    /// Number of `get` calls that missed
    pub misses: u64,
    /// Number of entries removed by trimming (explicit `remove` and `clear`
    /// are not evictions)
    pub evictions: u64,
    /// Current number of entries in the cache
    pub total_entries: usize,
    /// Current aggregate cost of all entries
    pub total_cost: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
