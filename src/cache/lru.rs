//! LRU Tracker Module
//!
//! Keeps keys in access order so the batch eviction sweep can pick the
//! least recently used ones without sorting the whole tier.

use std::collections::VecDeque;

/// Fraction of entries removed by one eviction sweep.
pub const EVICTION_FRACTION: f64 = 0.2;

// == LRU Tracker ==
/// Tracks access order for LRU eviction strategy.
///
/// Keys are stored in a VecDeque where:
/// - Front = Most recently used
/// - Back = Least recently used
#[derive(Debug, Default)]
pub struct LruTracker {
    order: VecDeque<String>,
}

impl LruTracker {
    pub fn new() -> Self {
        Self {
            order: VecDeque::new(),
        }
    }

    // == Touch ==
    /// Marks a key as recently used (moves to front).
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    // == Least Recent ==
    /// Returns up to `count` keys, least recently used first, without
    /// removing them. The most recently used key is never returned.
    pub fn least_recent(&self, count: usize) -> Vec<String> {
        let limit = count.min(self.order.len().saturating_sub(1));
        self.order.iter().rev().take(limit).cloned().collect()
    }

    // == Peek Oldest ==
    #[allow(dead_code)]
    pub fn peek_oldest(&self) -> Option<&String> {
        self.order.back()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[allow(dead_code)]
    pub fn contains(&self, key: &str) -> bool {
        self.order.iter().any(|k| k == key)
    }
}

/// Number of entries one eviction sweep removes from a tier of `len` entries:
/// 20% rounded up, at least one.
pub fn eviction_batch_size(len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    ((len as f64 * EVICTION_FRACTION).ceil() as usize).max(1)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_new() {
        let lru = LruTracker::new();
        assert!(lru.is_empty());
        assert_eq!(lru.len(), 0);
    }

    #[test]
    fn test_lru_touch_existing_key() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key2");
        lru.touch("key3");
        lru.touch("key1");

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.peek_oldest(), Some(&"key2".to_string()));
    }

    #[test]
    fn test_lru_remove() {
        let mut lru = LruTracker::new();

        lru.touch("key1");
        lru.touch("key2");
        lru.touch("key3");
        lru.remove("key2");
        lru.remove("nonexistent");

        assert_eq!(lru.len(), 2);
        assert!(!lru.contains("key2"));
        assert!(lru.contains("key1"));
        assert!(lru.contains("key3"));
    }

    #[test]
    fn test_least_recent_order() {
        let mut lru = LruTracker::new();

        for key in ["a", "b", "c", "d"] {
            lru.touch(key);
        }
        lru.touch("a");

        // Order front..back is now [a, d, c, b]
        assert_eq!(lru.least_recent(2), vec!["b".to_string(), "c".to_string()]);
        // Does not consume
        assert_eq!(lru.len(), 4);
    }

    #[test]
    fn test_least_recent_spares_most_recent() {
        let mut lru = LruTracker::new();
        lru.touch("only");
        assert!(lru.least_recent(1).is_empty());

        lru.touch("newer");
        assert_eq!(lru.least_recent(10), vec!["only".to_string()]);
    }

    #[test]
    fn test_eviction_batch_size() {
        assert_eq!(eviction_batch_size(0), 0);
        assert_eq!(eviction_batch_size(1), 1);
        assert_eq!(eviction_batch_size(5), 1);
        assert_eq!(eviction_batch_size(6), 2);
        assert_eq!(eviction_batch_size(10), 2);
        assert_eq!(eviction_batch_size(11), 3);
    }
}
