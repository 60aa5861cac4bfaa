//! Periodic Flush Task
//!
//! Background task that periodically trims the cache to size and flushes
//! buffered journal lines.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::DiskLruCache;

/// Spawns a task that calls [`DiskLruCache::flush`] every interval.
///
/// Cache operations block on file I/O, so each flush runs on tokio's
/// blocking pool. The task stops on its own once the cache is closed.
///
/// # Arguments
/// * `cache` - Handle to the cache to flush
/// * `flush_interval_secs` - Interval in seconds between flushes
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let cache = DiskLruCache::open("/tmp/cache", 1, 2, 1 << 20)?;
/// let flush_handle = spawn_flush_task(cache.clone(), 5);
/// // Later, during shutdown:
/// flush_handle.abort();
/// cache.close()?;
/// ```
pub fn spawn_flush_task(cache: DiskLruCache, flush_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(flush_interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting cache flush task with interval of {} seconds",
            flush_interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            if cache.is_closed() {
                info!("Cache closed, stopping flush task");
                break;
            }

            let handle = cache.clone();
            match tokio::task::spawn_blocking(move || handle.flush()).await {
                Ok(Ok(())) => debug!("Cache flush complete, size {} bytes", cache.size()),
                Ok(Err(err)) => warn!("Cache flush failed: {}", err),
                Err(err) => warn!("Cache flush task panicked: {}", err),
            }
        }
    })
}
