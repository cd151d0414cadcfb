//! Per-request render scope handed to components.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use ssr_cache::{CacheOptions, FetchKey, InflightFetches, Resource, ResourceCache};
use ssr_core::{RequestId, RouteParams};

/// What a component can see while rendering.
///
/// Cheap to clone; every clone shares the same cache and params.
#[derive(Debug, Clone)]
pub struct Scope {
    cache: Arc<ResourceCache>,
    fetches: Arc<InflightFetches<Value>>,
    params: Arc<RouteParams>,
    path: Arc<str>,
    request_id: RequestId,
}

impl Scope {
    /// Create a scope over a shared cache.
    pub fn new(cache: Arc<ResourceCache>, request_id: RequestId) -> Self {
        Self {
            cache,
            fetches: Arc::new(InflightFetches::new()),
            params: Arc::new(RouteParams::new()),
            path: Arc::from("/"),
            request_id,
        }
    }

    /// Share an in-flight fetch table, usually one per process.
    pub fn with_fetches(mut self, fetches: Arc<InflightFetches<Value>>) -> Self {
        self.fetches = fetches;
        self
    }

    /// Set route params.
    pub fn with_params(mut self, params: RouteParams) -> Self {
        self.params = Arc::new(params);
        self
    }

    /// Set the request path.
    pub fn with_path(mut self, path: impl AsRef<str>) -> Self {
        self.path = Arc::from(path.as_ref());
        self
    }

    /// The shared resource cache.
    pub fn cache(&self) -> &Arc<ResourceCache> {
        &self.cache
    }

    /// A route param by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// All route params.
    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    /// The request path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The request id.
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// The in-flight fetch table.
    pub fn fetches(&self) -> &Arc<InflightFetches<Value>> {
        &self.fetches
    }

    /// Cached resource for `key` with the cache's default TTL.
    pub fn resource<T, F, Fut>(&self, key: impl Into<String>, fetcher: F) -> Resource<serde_json::Value>
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.cache
            .create_cached(key, fetcher, self.cache.default_options())
    }

    /// Read `key` through the cache, suspending until it settles.
    ///
    /// A rejected fetch surfaces here as an error, so the nearest error
    /// boundary handles it.
    pub async fn read<T, F, Fut>(&self, key: impl Into<String>, fetcher: F) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.read_with(key, fetcher, self.cache.default_options()).await
    }

    /// [`Scope::read`] with explicit cache options.
    pub async fn read_with<T, F, Fut>(&self, key: impl Into<String>, fetcher: F, options: CacheOptions) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let resource = self.cache.create_cached(key, fetcher, options);
        resource.read_as::<T>().await.map_err(|e| e.into_anyhow())
    }

    /// Run an outbound request, joining an identical one already in flight.
    ///
    /// Nothing is kept after the request settles; wrap the returned future
    /// in [`Scope::read`] to cache the result as well.
    pub fn fetch<T, F, Fut>(&self, key: FetchKey, fetcher: F) -> BoxFuture<'static, anyhow::Result<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let shared = self.fetches.fetch(key, move || {
            let request = fetcher();
            async move { Ok::<_, anyhow::Error>(serde_json::to_value(request.await?)?) }
        });
        async move {
            let value = shared.await.map_err(|e| e.into_anyhow())?;
            Ok::<T, anyhow::Error>(serde_json::from_value(value)?)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> Scope {
        Scope::new(Arc::new(ResourceCache::new()), RequestId::from_string("req-1"))
    }

    #[test]
    fn test_params_and_path() {
        let mut params = RouteParams::new();
        params.insert("id".to_string(), "7".to_string());
        let scope = scope().with_params(params).with_path("/blog/7");

        assert_eq!(scope.param("id"), Some("7"));
        assert_eq!(scope.param("missing"), None);
        assert_eq!(scope.path(), "/blog/7");
        assert_eq!(scope.request_id().as_str(), "req-1");
    }

    #[tokio::test]
    async fn test_read_goes_through_cache() {
        let scope = scope();

        let first: u32 = scope.read("n", || async { Ok(1u32) }).await.unwrap();
        let second: u32 = scope.read("n", || async { Ok(2u32) }).await.unwrap();

        assert_eq!((first, second), (1, 1));
        assert_eq!(scope.cache().serialize().get("n"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_read_surfaces_rejection() {
        let scope = scope();

        let err = scope
            .read::<u32, _, _>("bad", || async { Err(anyhow::anyhow!("upstream 500")) })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("upstream 500"));
    }

    #[tokio::test]
    async fn test_fetch_joins_identical_request() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let fetches = Arc::new(InflightFetches::new());
        let first = scope().with_fetches(fetches.clone());
        let second = scope().with_fetches(fetches.clone());
        let calls = Arc::new(AtomicUsize::new(0));

        let request = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok::<_, anyhow::Error>(vec!["a".to_string(), "b".to_string()])
            }
        };
        let a = first.fetch::<Vec<String>, _, _>(FetchKey::get("/api/tags"), request(calls.clone()));
        let b = second.fetch::<Vec<String>, _, _>(FetchKey::get("/api/tags"), request(calls.clone()));
        let (a, b) = futures::join!(a, b);

        assert_eq!(a.unwrap(), vec!["a", "b"]);
        assert_eq!(b.unwrap(), vec!["a", "b"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(fetches.is_empty());
    }

    #[tokio::test]
    async fn test_cached_read_over_fetch() {
        let scope = scope();

        let request = scope.fetch::<u32, _, _>(FetchKey::get("/api/count"), || async { Ok(3u32) });
        let count: u32 = scope.read("count", move || request).await.unwrap();

        assert_eq!(count, 3);
        assert_eq!(scope.cache().serialize().get("count"), Some(&serde_json::json!(3)));
    }
}
