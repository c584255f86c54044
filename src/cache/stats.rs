//! Cache Statistics Module
//!
//! Tracks cache effectiveness: hits per tier, misses, expiries and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Tracks cache performance metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Fetches answered from the memory tier
    pub memory_hits: u64,
    /// Fetches answered from the disk tier
    pub disk_hits: u64,
    /// Fetches that found nothing usable (absent, expired or undecodable)
    pub misses: u64,
    /// Records dropped because they outlived the maximum age
    pub expired: u64,
    /// Disk records removed by compaction or trimming
    pub evictions: u64,
    /// Saves whose disk write did not succeed
    pub write_failures: u64,
    /// Current number of entries in the memory tier
    pub memory_entries: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of fetches that returned a value.
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.disk_hits
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no fetches have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    pub fn record_memory_hit(&mut self) {
        self.memory_hits += 1;
    }

    pub fn record_disk_hit(&mut self) {
        self.disk_hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_expired(&mut self) {
        self.expired += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_write_failure(&mut self) {
        self.write_failures += 1;
    }
}
