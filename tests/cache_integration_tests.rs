//! Integration Tests for the Cache Orchestrator
//!
//! Exercises `CacheService` through its public API only: expiry with a
//! manual clock, promotion across a simulated restart, eviction, and clear.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use talkkin_cache::cache::{CacheService, FileStore, JsonSerializer, ManualClock, MemoryStore};
use talkkin_cache::models::{CacheOptions, Priority};
use talkkin_cache::Config;
use tokio_test::{assert_err, assert_ok};

// == Helper Functions ==

fn cache_with(config: &Config, store: Arc<MemoryStore>) -> (CacheService, ManualClock) {
    let clock = ManualClock::new(1_700_000_000_000);
    let cache = CacheService::with_parts(
        config,
        store,
        Arc::new(clock.clone()),
        Arc::new(JsonSerializer),
    );
    (cache, clock)
}

fn languages() -> Value {
    json!([
        {"code": "yua", "name": "Maya"},
        {"code": "quz", "name": "Quechua"},
        {"code": "gn", "name": "Guaraní"}
    ])
}

// == Expiry ==

#[tokio::test]
async fn test_language_list_round_trip_and_clear() {
    let (cache, _clock) = cache_with(&Config::default(), Arc::new(MemoryStore::new()));

    assert_ok!(
        cache
            .set("lang:list", &languages(), CacheOptions::with_ttl(Duration::from_millis(86_400_000)))
            .await
    );
    assert_eq!(cache.get("lang:list").await, Some(languages()));

    cache.clear().await;
    assert_eq!(cache.get("lang:list").await, None);
}

#[tokio::test]
async fn test_entry_expires_after_ttl() {
    let (cache, clock) = cache_with(&Config::default(), Arc::new(MemoryStore::new()));
    let ttl = Duration::from_secs(30);

    cache.set("k", &json!("v"), CacheOptions::with_ttl(ttl)).await.unwrap();
    assert_eq!(cache.get("k").await, Some(json!("v")));

    clock.advance(ttl + Duration::from_millis(1));

    assert_eq!(cache.get("k").await, None);
    assert!(!cache.has("k").await);
}

// == Promotion ==

#[tokio::test]
async fn test_file_backed_entry_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let config = Config::default();

    {
        let store = Arc::new(FileStore::open(&path).await);
        let cache = CacheService::new(&config, store);
        cache
            .set(
                "lang:list",
                &languages(),
                CacheOptions::default().priority(Priority::High).compressed(),
            )
            .await
            .unwrap();
    }

    let store = Arc::new(FileStore::open(&path).await);
    let cache = CacheService::open(&config, store).await;

    assert!(cache.stats().await.storage_size > 0);
    assert_eq!(cache.get("lang:list").await, Some(languages()));
    assert_eq!(cache.stats().await.entry_count, 1);
}

#[tokio::test]
async fn test_second_read_after_restart_skips_durable_tier() {
    let store = Arc::new(MemoryStore::new());
    let config = Config::default();
    let (before_restart, _) = cache_with(&config, store.clone());
    before_restart.set("k", &json!({"a": 1}), CacheOptions::default()).await.unwrap();
    drop(before_restart);

    let (after_restart, _) = cache_with(&config, store.clone());
    let reads = store.reads();

    assert_eq!(after_restart.get("k").await, Some(json!({"a": 1})));
    assert_eq!(after_restart.get("k").await, Some(json!({"a": 1})));
    assert_eq!(store.reads(), reads + 1);
}

// == Eviction ==

#[tokio::test]
async fn test_memory_ceiling_evicts_least_recent_fifth() {
    // Each `"nnnnnnnn"` payload serializes to 10 bytes
    let config = Config {
        max_memory_size: 100,
        ..Config::default()
    };
    let (cache, clock) = cache_with(&config, Arc::new(MemoryStore::new()));

    for i in 0..10 {
        cache
            .set(&format!("key{i}"), &json!(format!("{i:08}")), CacheOptions::default())
            .await
            .unwrap();
        clock.advance(Duration::from_millis(1));
    }
    // key0 becomes the most recently read
    assert!(cache.has("key0").await);

    cache
        .set("key10", &json!("00000010"), CacheOptions::default())
        .await
        .unwrap();

    let stats = cache.stats().await;
    assert_eq!(stats.evictions, 3);
    assert_eq!(stats.entry_count, 8);
    assert!(cache.has("key0").await);
    assert!(cache.has("key10").await);
    for evicted in ["key1", "key2", "key3"] {
        assert!(!cache.has(evicted).await, "{evicted} should be evicted");
    }
}

// == Clear ==

#[tokio::test]
async fn test_clear_is_idempotent() {
    let (cache, _) = cache_with(&Config::default(), Arc::new(MemoryStore::new()));
    cache.set("a", &json!(1), CacheOptions::default()).await.unwrap();
    cache.set("b", &json!(2), CacheOptions::default()).await.unwrap();

    cache.clear().await;
    cache.clear().await;

    let stats = cache.stats().await;
    assert_eq!(stats.entry_count, 0);
    assert_eq!(stats.memory_size, 0);
    assert!(stats.oldest_entry.is_none());
    assert_eq!(cache.get("a").await, None);
    assert_eq!(cache.get("b").await, None);
}

#[tokio::test]
async fn test_unserializable_payload_is_rejected() {
    let (cache, _) = cache_with(&Config::default(), Arc::new(MemoryStore::new()));
    let bad: std::collections::BTreeMap<Vec<u8>, u8> = [(vec![1u8], 1u8)].into_iter().collect();

    assert_err!(cache.set("bad", &bad, CacheOptions::default()).await);
}
