//! Configuration Module
//!
//! Loads cache and request settings from environment variables once at startup.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Shortest sweep interval accepted; smaller values are raised to this.
pub const MIN_CLEANUP_INTERVAL_MS: u64 = 1_000;

/// Cache and request configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL prepended to every endpoint
    pub api_base_url: String,
    /// Per-attempt request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Total number of attempts for a request (first try included)
    pub retry_attempts: u32,
    /// Base retry delay in milliseconds, multiplied by the attempt number
    pub retry_delay_ms: u64,
    /// Default TTL in milliseconds for entries without explicit TTL
    pub default_ttl_ms: u64,
    /// Ceiling for the aggregate size of the memory tier, in bytes
    pub max_memory_size: u64,
    /// Ceiling for the aggregate size of the durable tier, in bytes
    pub max_storage_size: u64,
    /// Active-expiry sweep interval in milliseconds
    pub cleanup_interval_ms: u64,
    /// Entries smaller than this are mirrored to the durable tier
    pub durable_size_threshold: u64,
    /// Stored values larger than this are encoded when compression is requested
    pub compression_threshold: usize,
    /// Namespace prepended to every durable key
    pub storage_key_prefix: String,
    /// Path of the file backing the durable tier
    pub cache_file: String,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `API_BASE_URL` (default: https://api.talkkin.app)
    /// - `REQUEST_TIMEOUT_MS` (default: 30000)
    /// - `RETRY_ATTEMPTS` (default: 3)
    /// - `RETRY_DELAY_MS` (default: 1000)
    /// - `DEFAULT_TTL_MS` (default: 300000)
    /// - `MAX_MEMORY_SIZE` (default: 50 MiB)
    /// - `MAX_STORAGE_SIZE` (default: 100 MiB)
    /// - `CLEANUP_INTERVAL_MS` (default: 600000)
    /// - `DURABLE_SIZE_THRESHOLD` (default: 1024)
    /// - `COMPRESSION_THRESHOLD` (default: 1024)
    /// - `STORAGE_KEY_PREFIX` (default: talkkin_cache_)
    /// - `CACHE_FILE` (default: talkkin_cache.json)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a Config from an arbitrary variable lookup.
    ///
    /// Missing or unparseable values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |name: &str, fallback| parse_or(&lookup, name, fallback);

        Self {
            api_base_url: lookup("API_BASE_URL").unwrap_or(defaults.api_base_url),
            request_timeout_ms: parsed("REQUEST_TIMEOUT_MS", defaults.request_timeout_ms),
            retry_attempts: parse_or(&lookup, "RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_delay_ms: parsed("RETRY_DELAY_MS", defaults.retry_delay_ms),
            default_ttl_ms: parsed("DEFAULT_TTL_MS", defaults.default_ttl_ms),
            max_memory_size: parsed("MAX_MEMORY_SIZE", defaults.max_memory_size),
            max_storage_size: parsed("MAX_STORAGE_SIZE", defaults.max_storage_size),
            cleanup_interval_ms: parsed("CLEANUP_INTERVAL_MS", defaults.cleanup_interval_ms),
            durable_size_threshold: parsed(
                "DURABLE_SIZE_THRESHOLD",
                defaults.durable_size_threshold,
            ),
            compression_threshold: parse_or(
                &lookup,
                "COMPRESSION_THRESHOLD",
                defaults.compression_threshold,
            ),
            storage_key_prefix: lookup("STORAGE_KEY_PREFIX")
                .unwrap_or(defaults.storage_key_prefix),
            cache_file: lookup("CACHE_FILE").unwrap_or(defaults.cache_file),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms.max(MIN_CLEANUP_INTERVAL_MS))
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, fallback: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(name)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.talkkin.app".to_string(),
            request_timeout_ms: 30_000,
            retry_attempts: 3,
            retry_delay_ms: 1_000,
            default_ttl_ms: 5 * 60 * 1000,
            max_memory_size: 50 * 1024 * 1024,
            max_storage_size: 100 * 1024 * 1024,
            cleanup_interval_ms: 10 * 60 * 1000,
            durable_size_threshold: 1024,
            compression_threshold: 1024,
            storage_key_prefix: "talkkin_cache_".to_string(),
            cache_file: "talkkin_cache.json".to_string(),
        }
    }
}
