//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::clock::{Clock, SystemClock};
use super::storage::{CacheEntry, CacheStorage};
use crate::error::{FetchError, StoreError, TransportError};

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where returned data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from the transport
  Network,
  /// Data from the store, younger than the cache duration
  Cache,
}

/// Read-through cache with time-based expiry.
///
/// Sits between the hooks and the transport and owns the staleness policy. It holds
/// no entries itself; the storage backend is the single source of truth. Build one
/// per process and share it by cloning.
pub struct CacheManager {
  storage: Arc<dyn CacheStorage>,
  clock: Arc<dyn Clock>,
}

impl CacheManager {
  /// Create a new cache manager over the given storage backend.
  pub fn new(storage: Arc<dyn CacheStorage>) -> Self {
    Self::with_clock(storage, Arc::new(SystemClock))
  }

  /// Create a cache manager that ages entries against `clock`.
  pub fn with_clock(storage: Arc<dyn CacheStorage>, clock: Arc<dyn Clock>) -> Self {
    Self { storage, clock }
  }

  /// Whether an entry written at `stored_at` is still servable.
  fn is_fresh(&self, stored_at: DateTime<Utc>, cache_duration: Duration) -> bool {
    // Zero duration never serves from the store, even if the clock stepped back
    if cache_duration.is_zero() {
      return false;
    }
    let age = (self.clock.now() - stored_at).num_milliseconds();
    let limit = i64::try_from(cache_duration.as_millis()).unwrap_or(i64::MAX);
    age < limit
  }

  /// Resolve `key` through the cache.
  ///
  /// 1. Fresh entry in the store: return it, nothing else happens
  /// 2. Stale entry: delete it before fetching, whatever the fetch outcome
  /// 3. Fetch from the transport; on success store the result and return it
  ///
  /// Store failures are returned as errors, never treated as a miss. A zero
  /// `cache_duration` always refetches.
  pub async fn resolve<F, Fut>(
    &self,
    key: &str,
    cache_duration: Duration,
    fetcher: F,
  ) -> Result<CacheResult<Value>, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, TransportError>>,
  {
    if let Some(entry) = self.storage.get(key)? {
      if self.is_fresh(entry.stored_at, cache_duration) {
        debug!(key, "cache hit");
        return Ok(CacheResult::from_cache(entry.payload, entry.stored_at));
      }

      debug!(key, "cache entry stale, deleting");
      self.storage.delete(key)?;
    } else {
      debug!(key, "cache miss");
    }

    let data = fetcher().await?;
    self.storage.put(key, &data)?;

    Ok(CacheResult::from_network(data))
  }

  /// Drop the entry for `key` so the next resolve goes to the transport.
  pub fn invalidate(&self, key: &str) -> Result<(), StoreError> {
    debug!(key, "invalidating cache entry");
    self.storage.delete(key)
  }

  /// Read the stored entry for `key` without applying any expiry.
  pub fn peek(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
    self.storage.get(key)
  }

  /// Remove entries older than `max_age`, returning how many were removed.
  pub fn prune(&self, max_age: Duration) -> Result<usize, StoreError> {
    let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
    let cutoff_ms = self.clock.now().timestamp_millis().saturating_sub(max_age_ms);
    let cutoff = DateTime::from_timestamp_millis(cutoff_ms).unwrap_or(DateTime::<Utc>::MIN_UTC);
    self.storage.purge_before(cutoff)
  }

  /// Remove every entry.
  pub fn clear(&self) -> Result<(), StoreError> {
    self.storage.clear()
  }
}

impl Clone for CacheManager {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      clock: Arc::clone(&self.clock),
    }
  }
}
