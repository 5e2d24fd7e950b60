//! Cache Entry Module
//!
//! Defines the unit of cached data plus its freshness and access metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// == Cache Entry ==
/// A single cached payload with its metadata.
///
/// The same shape is written to the durable tier, so field names are stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    /// Key the entry is stored under
    pub key: String,
    /// The stored payload
    pub data: Value,
    /// Creation timestamp (Unix milliseconds)
    pub timestamp: u64,
    /// Lifetime in milliseconds
    pub ttl: u64,
    /// Number of successful reads
    #[serde(default)]
    pub access_count: u64,
    /// Timestamp of the last successful read (Unix milliseconds)
    #[serde(default)]
    pub last_access: u64,
    /// Serialized size of `data` in bytes
    pub size: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a fresh entry stamped at `now_ms`.
    pub fn new(key: impl Into<String>, data: Value, ttl_ms: u64, size: u64, now_ms: u64) -> Self {
        Self {
            key: key.into(),
            data,
            timestamp: now_ms,
            ttl: ttl_ms,
            access_count: 0,
            last_access: now_ms,
            size,
        }
    }

    // == Is Expired ==
    /// An entry is stale once its age strictly exceeds its TTL.
    ///
    /// A clock that moved backwards yields an age of zero, never a panic.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.age_ms(now_ms) > self.ttl
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.timestamp)
    }

    // == Time To Live ==
    /// Remaining lifetime in milliseconds, zero once stale.
    pub fn ttl_remaining_ms(&self, now_ms: u64) -> u64 {
        self.ttl.saturating_sub(self.age_ms(now_ms))
    }

    // == Touch ==
    /// Records a successful read.
    pub fn touch(&mut self, now_ms: u64) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_access = now_ms;
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(ttl: u64) -> CacheEntry {
        CacheEntry::new("k", json!("v"), ttl, 3, 1_000)
    }

    #[test]
    fn test_entry_creation() {
        let entry = entry(60_000);

        assert_eq!(entry.data, json!("v"));
        assert_eq!(entry.timestamp, 1_000);
        assert_eq!(entry.last_access, 1_000);
        assert_eq!(entry.access_count, 0);
        assert!(!entry.is_expired(1_000));
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let entry = entry(500);

        // Age equal to the TTL is still fresh
        assert!(!entry.is_expired(1_500));
        assert!(entry.is_expired(1_501));
    }

    #[test]
    fn test_clock_skew_is_not_expired() {
        let entry = entry(500);
        assert!(!entry.is_expired(0));
        assert_eq!(entry.age_ms(0), 0);
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = entry(10_000);

        assert_eq!(entry.ttl_remaining_ms(1_000), 10_000);
        assert_eq!(entry.ttl_remaining_ms(4_000), 7_000);
        assert_eq!(entry.ttl_remaining_ms(50_000), 0);
    }

    #[test]
    fn test_touch_updates_access_metadata() {
        let mut entry = entry(10_000);

        entry.touch(2_000);
        entry.touch(3_000);

        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.last_access, 3_000);
    }

    #[test]
    fn test_entry_uses_camel_case_on_disk() {
        let json = serde_json::to_string(&entry(1)).unwrap();
        assert!(json.contains("\"accessCount\""));
        assert!(json.contains("\"lastAccess\""));
    }
}
