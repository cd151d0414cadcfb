//! Dedup of identical concurrent outbound fetches.
//!
//! Narrower than [`crate::ResourceCache`]: requests are keyed by method,
//! URL and body, and a key is forgotten as soon as its fetch settles, so
//! nothing is served from memory once the response has been handed out.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;

use crate::resource::ResourceError;

/// Identity of an outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FetchKey {
    /// HTTP method, upper-cased.
    pub method: String,
    /// Absolute or relative URL.
    pub url: String,
    /// Request body, if any.
    pub body: Option<String>,
}

impl FetchKey {
    /// Create a key without a body.
    pub fn new(method: impl AsRef<str>, url: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            url: url.into(),
            body: None,
        }
    }

    /// Shorthand for a GET.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

impl fmt::Display for FetchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, ResourceError>>>;

type PendingMap<T> = HashMap<FetchKey, (u64, SharedFetch<T>)>;

/// Table of fetches currently in flight.
pub struct InflightFetches<T> {
    pending: Arc<Mutex<PendingMap<T>>>,
    next_generation: AtomicU64,
}

impl<T> fmt::Debug for InflightFetches<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InflightFetches")
            .field("in_flight", &lock(&self.pending).len())
            .finish()
    }
}

impl<T> InflightFetches<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Join the in-flight fetch for `key`, or start one with `fetcher`.
    ///
    /// Every caller joining the same fetch sees the same result, including
    /// the same rejection. The key is removed once the fetch settles.
    pub fn fetch<F, Fut>(&self, key: FetchKey, fetcher: F) -> BoxFuture<'static, Result<T, ResourceError>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let mut pending = lock(&self.pending);

        let (generation, shared) = match pending.get(&key) {
            Some((generation, shared)) => {
                tracing::trace!(fetch = %key, "joining in-flight fetch");
                (*generation, shared.clone())
            }
            None => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let request = fetcher();
                let shared = async move { request.await.map_err(|e| ResourceError::Rejected(Arc::new(e))) }
                    .boxed()
                    .shared();
                pending.insert(key.clone(), (generation, shared.clone()));
                (generation, shared)
            }
        };
        drop(pending);

        let table = Arc::clone(&self.pending);
        async move {
            let result = shared.await;
            let mut pending = lock(&table);
            if matches!(pending.get(&key), Some((g, _)) if *g == generation) {
                pending.remove(&key);
            }
            result
        }
        .boxed()
    }

    /// Number of fetches in flight.
    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for InflightFetches<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(pending: &Mutex<PendingMap<T>>) -> MutexGuard<'_, PendingMap<T>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn slow_fetch(calls: &Arc<AtomicUsize>, value: u32) -> impl FnOnce() -> BoxFuture<'static, anyhow::Result<u32>> {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[test]
    fn test_fetch_key_normalizes_method() {
        assert_eq!(FetchKey::new("get", "/api/posts"), FetchKey::get("/api/posts"));
        assert_ne!(
            FetchKey::new("POST", "/api/posts").with_body("{\"a\":1}"),
            FetchKey::new("POST", "/api/posts").with_body("{\"a\":2}")
        );
        assert_eq!(FetchKey::get("/x").to_string(), "GET /x");
    }

    #[tokio::test]
    async fn test_identical_fetches_share_one_request() {
        let inflight = InflightFetches::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = inflight.fetch(FetchKey::get("/api/posts/1"), slow_fetch(&calls, 1));
        let b = inflight.fetch(FetchKey::get("/api/posts/1"), slow_fetch(&calls, 2));
        assert_eq!(inflight.len(), 1);

        let (a, b) = futures::join!(a, b);
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_bodies_fetch_separately() {
        let inflight = InflightFetches::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let a = inflight.fetch(FetchKey::new("POST", "/q").with_body("a"), slow_fetch(&calls, 1));
        let b = inflight.fetch(FetchKey::new("POST", "/q").with_body("b"), slow_fetch(&calls, 2));

        let (a, b) = futures::join!(a, b);
        assert_eq!((a.unwrap(), b.unwrap()), (1, 2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_key_is_forgotten_after_settle() {
        let inflight = InflightFetches::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        inflight.fetch(FetchKey::get("/a"), slow_fetch(&calls, 1)).await.unwrap();
        assert!(inflight.is_empty());

        let again = inflight.fetch(FetchKey::get("/a"), slow_fetch(&calls, 2)).await.unwrap();
        assert_eq!(again, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rejection_is_shared() {
        let inflight = InflightFetches::<u32>::new();

        let a = inflight.fetch(FetchKey::get("/down"), || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(anyhow::anyhow!("503"))
        });
        let b = inflight.fetch(FetchKey::get("/down"), || async { Ok(7) });

        let (a, b) = futures::join!(a, b);
        assert!(a.unwrap_err().to_string().contains("503"));
        assert!(b.unwrap_err().to_string().contains("503"));
    }
}
