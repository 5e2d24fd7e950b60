//! Memory Tier Module
//!
//! Bounded in-process store combining HashMap storage with LRU tracking,
//! lazy TTL checks and size accounting. All methods are synchronous; the
//! orchestrator calls them under a single lock so each call is one atomic
//! bookkeeping unit.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, info};

use crate::cache::lru::eviction_batch_size;
use crate::cache::{CacheEntry, CacheStats, LruTracker};

// == Lookup Result ==
/// Outcome of a memory-tier read.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// Fresh entry found; access metadata already updated
    Hit(Value),
    /// Entry was present but stale and has been removed
    Expired,
    /// Key not present in memory
    Absent,
}

// == Memory Tier ==
/// In-memory cache storage with batch LRU eviction and TTL support.
#[derive(Debug)]
pub struct MemoryTier {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    stats: CacheStats,
    /// Ceiling for the aggregate tracked size, in bytes
    max_memory_size: u64,
}

impl MemoryTier {
    pub fn new(max_memory_size: u64) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_memory_size,
        }
    }

    // == Insert ==
    /// Stores an entry, replacing any previous one under the same key.
    ///
    /// Runs the ceiling check before returning; the keys removed by it are
    /// returned so the caller can drop them from the durable tier as well.
    pub fn insert(&mut self, entry: CacheEntry) -> Vec<String> {
        let key = entry.key.clone();
        self.stats.memory_size += entry.size;
        if let Some(previous) = self.entries.insert(key.clone(), entry) {
            self.stats.memory_size = self.stats.memory_size.saturating_sub(previous.size);
        }
        self.lru.touch(&key);

        self.evict_if_needed()
    }

    // == Lookup ==
    /// Reads a key, re-validating expiry first.
    ///
    /// A hit updates access metadata and the hit ratio. A stale entry is
    /// removed and counted as a miss. An absent key records nothing: the
    /// caller still has the durable tier to consult.
    pub fn lookup(&mut self, key: &str, now_ms: u64) -> Lookup {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(now_ms),
            None => return Lookup::Absent,
        };

        if expired {
            self.remove(key);
            self.stats.record_expired(1);
            self.stats.record_miss();
            debug!(key, "Memory entry expired on read");
            return Lookup::Expired;
        }

        let Some(entry) = self.entries.get_mut(key) else {
            return Lookup::Absent;
        };
        entry.touch(now_ms);
        let data = entry.data.clone();
        self.lru.touch(key);
        self.stats.record_hit();
        Lookup::Hit(data)
    }

    // == Promote ==
    /// Inserts an entry read back from the durable tier and serves it.
    ///
    /// Returns the data (or `None` if the stored copy was stale) together
    /// with any keys evicted to make room.
    pub fn promote(&mut self, entry: CacheEntry, now_ms: u64) -> (Option<Value>, Vec<String>) {
        if entry.is_expired(now_ms) {
            self.stats.record_expired(1);
            self.stats.record_miss();
            return (None, Vec::new());
        }

        let key = entry.key.clone();
        let evicted = self.insert(entry);
        match self.lookup(&key, now_ms) {
            Lookup::Hit(data) => (Some(data), evicted),
            _ => (None, evicted),
        }
    }

    /// Counts a read that neither tier could serve.
    pub fn record_miss(&mut self) {
        self.stats.record_miss();
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.stats.memory_size = self.stats.memory_size.saturating_sub(entry.size);
        Some(entry)
    }

    // == Clear ==
    /// Drops every entry and resets all statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats = CacheStats::new();
    }

    // == Remove Expired ==
    /// Removes every stale entry and returns their keys.
    pub fn remove_expired(&mut self, now_ms: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now_ms))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.remove(key);
        }
        self.stats.record_expired(expired.len());
        expired
    }

    // == Evict If Needed ==
    /// One batch LRU sweep when the tracked size exceeds the ceiling.
    ///
    /// Removes the least recently used 20% (at least one entry), never the
    /// most recently used one.
    pub fn evict_if_needed(&mut self) -> Vec<String> {
        if self.stats.memory_size <= self.max_memory_size {
            return Vec::new();
        }

        let victims = self.lru.least_recent(eviction_batch_size(self.entries.len()));
        for key in &victims {
            self.remove(key);
        }
        self.stats.record_evictions(victims.len());

        if !victims.is_empty() {
            info!(
                "LRU sweep: evicted {} entries, memory size now {} bytes",
                victims.len(),
                self.stats.memory_size
            );
        }
        victims
    }

    // == Stats ==
    /// Returns current statistics with occupancy fields filled in.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.entry_count = self.entries.len();
        stats.oldest_entry = self.entries.values().map(|e| e.timestamp).min();
        stats.newest_entry = self.entries.values().map(|e| e.timestamp).max();
        stats
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn memory_size(&self) -> u64 {
        self.stats.memory_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
