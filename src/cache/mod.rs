//! Cache Module
//!
//! Two-tier caching: a bounded memory tier with TTL expiration and batch LRU
//! eviction, mirrored into a durable key-value store.

mod clock;
pub mod durable;
mod entry;
mod lru;
mod serializer;
mod service;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use durable::{DurableStore, FileStore, MemoryStore};
pub use entry::CacheEntry;
pub use lru::{eviction_batch_size, LruTracker};
pub use serializer::{JsonSerializer, PayloadSerializer};
pub use service::{CacheService, WeakCacheService};
pub use stats::CacheStats;
pub use store::{Lookup, MemoryTier};
