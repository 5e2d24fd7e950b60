//! Durable Tier Module
//!
//! The persistent key-value boundary and the codec used to store entries
//! in it. Two stores ship with the crate: an in-process map for tests and
//! ephemeral sessions, and a JSON file that survives restarts.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};

// == Durable Store Trait ==
/// Persistent string key-value store.
///
/// Implementations may fail transiently; the cache orchestrator treats every
/// error as "not durably cached" and carries on.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    async fn set_item(&self, key: &str, value: String) -> Result<()>;

    async fn remove_item(&self, key: &str) -> Result<()>;

    async fn get_all_keys(&self) -> Result<Vec<String>>;

    async fn multi_remove(&self, keys: &[String]) -> Result<()>;
}

// == Memory Store ==
/// Volatile store backed by a HashMap. Counts reads so callers can tell
/// whether a value was served from here.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
    reads: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get_item` calls served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.items.read().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<()> {
        self.items.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.write().remove(key);
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>> {
        Ok(self.items.read().keys().cloned().collect())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<()> {
        let mut items = self.items.write();
        for key in keys {
            items.remove(key);
        }
        Ok(())
    }
}

// == File Store ==
/// Store persisted as a single JSON object on disk.
///
/// The whole map is rewritten on every mutation through a temporary file and
/// a rename, so a crash never leaves a half-written file behind.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    items: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file is missing or
    /// corrupt.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let items = Self::load(&path).await;
        debug!("Durable file store opened at {} with {} items", path.display(), items.len());
        Self {
            path,
            items: Mutex::new(items),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(path: &Path) -> HashMap<String, String> {
        match tokio::fs::read_to_string(path).await {
            Ok(data) => match serde_json::from_str(&data) {
                Ok(items) => items,
                Err(e) => {
                    warn!("Durable cache file is corrupt, starting empty: {}", e);
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!("Failed to read durable cache file, starting empty: {}", e);
                HashMap::new()
            }
        }
    }

    async fn persist(&self, items: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let data = serde_json::to_vec(items)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<()> {
        let mut items = self.items.lock().await;
        items.insert(key.to_string(), value);
        self.persist(&items).await
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self.items.lock().await;
        if items.remove(key).is_some() {
            self.persist(&items).await?;
        }
        Ok(())
    }

    async fn get_all_keys(&self) -> Result<Vec<String>> {
        Ok(self.items.lock().await.keys().cloned().collect())
    }

    async fn multi_remove(&self, keys: &[String]) -> Result<()> {
        let mut items = self.items.lock().await;
        let before = items.len();
        for key in keys {
            items.remove(key);
        }
        if items.len() != before {
            self.persist(&items).await?;
        }
        Ok(())
    }
}

// == Storage Codec ==
/// Serializes an entry for the durable tier.
///
/// When `compress` is set and the JSON exceeds `threshold` bytes, the value
/// is base64-encoded. JSON objects always start with `{`, which is outside
/// the base64 alphabet, so the two forms never collide.
pub fn encode_entry(entry: &CacheEntry, compress: bool, threshold: usize) -> Result<String> {
    let json = serde_json::to_string(entry)?;
    if compress && json.len() > threshold {
        return Ok(STANDARD.encode(json.as_bytes()));
    }
    Ok(json)
}

/// Reads an entry back from its stored form.
///
/// Encoded values are decoded first; if that fails the value is parsed as
/// plain JSON. An unreadable value yields `None`, never an error.
pub fn decode_entry(stored: &str) -> Option<CacheEntry> {
    if looks_encoded(stored) {
        let decoded = STANDARD
            .decode(stored.as_bytes())
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<CacheEntry>(&bytes).map_err(|e| e.to_string())
            });
        match decoded {
            Ok(entry) => return Some(entry),
            Err(e) => debug!("Stored value is not encoded, parsing as plain: {}", e),
        }
    }

    match serde_json::from_str(stored) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("Unreadable durable cache value: {}", CacheError::from(e));
            None
        }
    }
}

fn looks_encoded(stored: &str) -> bool {
    !stored.is_empty()
        && stored
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}
