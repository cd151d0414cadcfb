//! Keyed resource store with TTL and client handoff.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Map, Value};
use ssr_core::{Clock, SystemClock};

use crate::resource::{Resource, ResourceStatus};

/// Default time-to-live for cached resources.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Options for a cached read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// How long an entry stays live after creation.
    pub ttl: Duration,
}

impl CacheOptions {
    /// Options with a specific TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL }
    }
}

/// A stored resource and when it was created.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The resource.
    pub resource: Resource<Value>,
    /// Creation instant.
    pub created_at: Instant,
}

impl CacheEntry {
    /// Whether the entry is still live for the given TTL.
    pub fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) < ttl
    }
}

/// Shared store of suspense resources keyed by cache key.
///
/// One instance is shared by every request the process serves, so
/// concurrent requests reading the same key share one fetch. Expired
/// entries are not evicted; they are replaced by the next read of their key.
///
/// Lookup, fetcher invocation and insertion happen under one lock with no
/// suspension point in between, so at most one live resource exists per key
/// and every caller inside a TTL window receives that same resource. The
/// fetcher should only construct its future; the future itself runs on its
/// own task after the lock is released.
#[derive(Debug)]
pub struct ResourceCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl ResourceCache {
    /// Create an empty cache using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty cache reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            default_ttl: DEFAULT_TTL,
        }
    }

    /// Set the TTL used by [`ResourceCache::default_options`].
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Options carrying this cache's default TTL.
    pub fn default_options(&self) -> CacheOptions {
        CacheOptions::with_ttl(self.default_ttl)
    }

    /// Wrap a future in a resource without caching it.
    pub fn create<T, F>(&self, future: F) -> Resource<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Resource::new(future)
    }

    /// Read `key`, fetching only if no live entry exists.
    ///
    /// A live entry is returned unchanged and `fetcher` is not called.
    /// Otherwise `fetcher` is called once, its future is wrapped in a
    /// resource, and the resource is stored with the current time.
    pub fn create_cached<T, F, Fut>(&self, key: impl Into<String>, fetcher: F, options: CacheOptions) -> Resource<Value>
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let key = key.into();
        let now = self.clock.now();
        let mut entries = self.lock();

        if let Some(entry) = entries.get(&key) {
            if entry.is_live(now, options.ttl) {
                tracing::trace!(cache_key = %key, "resource cache hit");
                return entry.resource.clone();
            }
            tracing::debug!(cache_key = %key, "resource cache entry expired");
        }

        let fetch = fetcher();
        let resource = Resource::new(async move {
            let value = fetch.await?;
            Ok(serde_json::to_value(value)?)
        });
        entries.insert(
            key.clone(),
            CacheEntry {
                resource: resource.clone(),
                created_at: now,
            },
        );
        tracing::debug!(cache_key = %key, "resource cache miss, fetching");

        resource
    }

    /// Warm the cache for `key` ahead of a read.
    pub fn preload<T, F, Fut>(&self, key: impl Into<String>, fetcher: F, options: CacheOptions)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let _ = self.create_cached(key, fetcher, options);
    }

    /// Live resource for `key`, without fetching.
    pub fn get(&self, key: &str, options: CacheOptions) -> Option<Resource<Value>> {
        let now = self.clock.now();
        self.lock()
            .get(key)
            .filter(|entry| entry.is_live(now, options.ttl))
            .map(|entry| entry.resource.clone())
    }

    /// Status of the entry stored under `key`, live or not.
    pub fn status_of(&self, key: &str) -> Option<ResourceStatus> {
        self.lock().get(key).map(|entry| entry.resource.status())
    }

    /// Remove `key` so the next read refetches.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.lock().remove(key).is_some();
        if removed {
            tracing::debug!(cache_key = %key, "resource cache entry invalidated");
        }
        removed
    }

    /// Remove every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Snapshot of every fulfilled value, keyed by cache key.
    ///
    /// Pending and rejected entries are omitted; the client cannot replay them.
    pub fn serialize(&self) -> Map<String, Value> {
        self.lock()
            .iter()
            .filter_map(|(key, entry)| entry.resource.value().map(|value| (key.clone(), value)))
            .collect()
    }

    /// Install already-fulfilled resources from a snapshot.
    ///
    /// Each key gets a fresh timestamp; no fetch runs.
    pub fn hydrate(&self, snapshot: Map<String, Value>) {
        let now = self.clock.now();
        let mut entries = self.lock();
        for (key, value) in snapshot {
            entries.insert(
                key,
                CacheEntry {
                    resource: Resource::fulfilled(value),
                    created_at: now,
                },
            );
        }
    }

    /// Number of stored entries, including expired ones.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}
