//! TalkKin Cache - client-side caching and request layer
//!
//! A bounded memory tier mirrored into a durable store, fronted by a request
//! coordinator with timeouts, retries and in-flight deduplication.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod tasks;

pub use api::{ApiService, ReqwestTransport, Transport};
pub use cache::{CacheService, DurableStore, FileStore, MemoryStore};
pub use config::Config;
pub use tasks::spawn_cleanup_task;
