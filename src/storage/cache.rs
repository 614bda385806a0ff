//! Read cache for storage reads.
//!
//! Reads are cached by `(path, range, time bucket)` where the time bucket is
//! `floor(now / ttl)`. When the bucket rotates, older entries are not purged:
//! they become unreachable keys and leave the cache through LRU eviction only.
//!
//! Setting the capacity to 1 and the TTL to 1 second is the documented way to
//! "disable" caching. It still keeps one entry for at most one second.
//!
//! Concurrent misses on the same key share a single fetch. If that fetch is
//! dropped before completing, one of the waiters takes it over.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use lru::LruCache;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::StorageError;

/// Byte range of a partial read: `(offset, length)`.
pub type ByteRange = (u64, u64);

/// Cache key for a read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReadCacheKey {
    /// Full storage path
    pub path: Arc<str>,

    /// Partial read range, `None` for a full read
    pub range: Option<ByteRange>,

    /// Time bucket the read belongs to
    pub time_bucket: u64,
}

type InFlight = HashMap<ReadCacheKey, Arc<Notify>>;

fn lock_in_flight(in_flight: &SyncMutex<InFlight>) -> MutexGuard<'_, InFlight> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Marks a key as being fetched.
///
/// Dropping the guard releases the key and wakes waiters, whether the fetch
/// completed or its future was dropped midway.
struct InFlightGuard<'a> {
    in_flight: &'a SyncMutex<InFlight>,
    key: ReadCacheKey,
    notify: Arc<Notify>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock_in_flight(self.in_flight).remove(&self.key);
        self.notify.notify_waiters();
    }
}

/// Bounded LRU cache of storage reads.
///
/// # Thread Safety
///
/// Lookups, insertions and evictions go through a single mutex, so recency
/// order and capacity stay consistent when shared across tasks via `Arc`.
pub struct ReadCache {
    entries: Mutex<LruCache<ReadCacheKey, Bytes>>,
    ttl_secs: Option<u64>,
    in_flight: SyncMutex<InFlight>,
    clock: fn() -> u64,
}

impl ReadCache {
    /// Create a cache.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries, `None` for unbounded
    /// * `ttl_secs` - Time bucket length, `None` to never rotate buckets
    pub fn new(capacity: Option<usize>, ttl_secs: Option<u64>) -> Self {
        let entries = match capacity.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };

        Self {
            entries: Mutex::new(entries),
            ttl_secs,
            in_flight: SyncMutex::new(HashMap::new()),
            clock: unix_now,
        }
    }

    /// Create a cache sized from the storage configuration.
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.cache_capacity(), config.cache_ttl_secs())
    }

    /// Current time bucket.
    pub fn time_bucket(&self) -> u64 {
        match self.ttl_secs {
            Some(ttl) => (self.clock)() / ttl,
            None => 0,
        }
    }

    fn key(&self, path: &str, range: Option<ByteRange>) -> ReadCacheKey {
        ReadCacheKey {
            path: Arc::from(path),
            range,
            time_bucket: self.time_bucket(),
        }
    }

    /// Return the cached bytes for `(path, range)` or run `fetch` and cache its result.
    ///
    /// Errors are returned to the caller and never cached.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        path: &str,
        range: Option<ByteRange>,
        fetch: F,
    ) -> Result<Bytes, StorageError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, StorageError>>,
    {
        let key = self.key(path, range);

        let guard = loop {
            {
                let mut entries = self.entries.lock().await;
                if let Some(data) = entries.get(&key) {
                    debug!(path, ?range, "read cache hit");
                    return Ok(data.clone());
                }
            }

            let (notify, leader) = {
                let mut in_flight = lock_in_flight(&self.in_flight);
                match in_flight.get(&key) {
                    Some(notify) => (notify.clone(), false),
                    None => {
                        let notify = Arc::new(Notify::new());
                        in_flight.insert(key.clone(), notify.clone());
                        (notify, true)
                    }
                }
            };

            if leader {
                break InFlightGuard {
                    in_flight: &self.in_flight,
                    key: key.clone(),
                    notify,
                };
            }

            // Register before checking the key again, so a release between
            // the two steps still wakes this task.
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let still_pending = lock_in_flight(&self.in_flight)
                .get(&key)
                .is_some_and(|current| Arc::ptr_eq(current, &notify));
            if still_pending {
                notified.await;
            }
        };

        debug!(path, ?range, "read cache miss");
        let result = fetch().await;

        if let Ok(ref data) = result {
            self.entries.lock().await.put(key, data.clone());
        }
        drop(guard);

        result
    }

    /// Check if a read is cached in the current bucket, without touching recency.
    pub async fn contains(&self, path: &str, range: Option<ByteRange>) -> bool {
        let key = self.key(path, range);
        self.entries.lock().await.contains(&key)
    }

    /// Number of cached entries, stale buckets included.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Drop every cached entry.
    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::from_config(&StorageConfig::default())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
