//! Cache Statistics Module
//!
//! Tracks hit ratio, tier sizes, and removal counters.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of cache performance and occupancy.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of entries in the memory tier
    pub entry_count: usize,
    /// Aggregate tracked size of the memory tier, in bytes
    pub memory_size: u64,
    /// Aggregate size of values written to the durable tier, in bytes
    pub storage_size: u64,
    /// totalHits / totalRequests, in [0, 1]
    pub hit_rate: f64,
    /// Number of `get` calls
    pub total_requests: u64,
    /// Number of `get` calls that returned data
    pub total_hits: u64,
    /// Number of `get` calls that returned nothing
    pub misses: u64,
    /// Entries removed by the LRU sweep
    pub evictions: u64,
    /// Entries removed because they were stale
    pub expired: u64,
    /// Creation timestamp of the oldest memory entry
    pub oldest_entry: Option<u64>,
    /// Creation timestamp of the newest memory entry
    pub newest_entry: Option<u64>,
}

impl CacheStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record Hit ==
    pub fn record_hit(&mut self) {
        self.total_requests += 1;
        self.total_hits += 1;
        self.refresh_hit_rate();
    }

    // == Record Miss ==
    pub fn record_miss(&mut self) {
        self.total_requests += 1;
        self.misses += 1;
        self.refresh_hit_rate();
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_expired(&mut self, count: usize) {
        self.expired += count as u64;
    }

    fn refresh_hit_rate(&mut self) {
        self.hit_rate = if self.total_requests == 0 {
            0.0
        } else {
            self.total_hits as f64 / self.total_requests as f64
        };
    }
}
