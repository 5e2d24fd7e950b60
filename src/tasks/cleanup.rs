//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries,
//! independent of request traffic.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::WeakCacheService;
use crate::config::MIN_CLEANUP_INTERVAL_MS;

/// Spawns a background task that periodically sweeps expired cache entries.
///
/// The task holds only a weak handle: it ends on its own once the last
/// `CacheService` is dropped. Call `abort()` on the returned handle (or
/// `CacheService::shutdown`) to stop it earlier. Intervals shorter than
/// `MIN_CLEANUP_INTERVAL_MS` are raised to it.
///
/// # Example
/// ```ignore
/// let handle = spawn_cleanup_task(cache.downgrade(), Duration::from_secs(600));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_cleanup_task(cache: WeakCacheService, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(Duration::from_millis(MIN_CLEANUP_INTERVAL_MS));
    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let Some(cache) = cache.upgrade() else {
                debug!("Cache dropped, stopping TTL cleanup task");
                break;
            };
            let removed = cache.cleanup_expired().await;
            drop(cache);

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
