//! Settled-once resources.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// The backing fetch has not settled.
    Pending,
    /// The fetch produced a value.
    Fulfilled,
    /// The fetch failed.
    Rejected,
}

/// Why a resource did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResourceError {
    /// The fetch returned an error.
    #[error("resource rejected: {0}")]
    Rejected(Arc<anyhow::Error>),

    /// The fetch panicked.
    #[error("resource fetch panicked: {0}")]
    Panicked(String),

    /// The value could not be converted to the requested type.
    #[error("resource value has unexpected shape: {0}")]
    Decode(String),

    /// The driver went away without settling (runtime shutdown).
    #[error("resource driver dropped before settling")]
    Dropped,
}

impl ResourceError {
    /// Convert into an `anyhow::Error` for propagation through render code.
    pub fn into_anyhow(self) -> anyhow::Error {
        anyhow::Error::new(self)
    }
}

#[derive(Debug, Clone)]
enum Settlement<T> {
    Pending,
    Fulfilled(T),
    Rejected(ResourceError),
}

impl<T> Settlement<T> {
    fn status(&self) -> ResourceStatus {
        match self {
            Self::Pending => ResourceStatus::Pending,
            Self::Fulfilled(_) => ResourceStatus::Fulfilled,
            Self::Rejected(_) => ResourceStatus::Rejected,
        }
    }
}

/// A handle over a fetch that settles exactly once.
///
/// The backing future runs on its own task; only that task writes the
/// settlement, so status moves from pending to fulfilled or rejected once
/// and never back. Rejections are captured, not raised: they surface when
/// a reader awaits [`Resource::read`].
#[derive(Debug)]
pub struct Resource<T> {
    state: watch::Receiver<Settlement<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T> Resource<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wrap a future, driving it to completion on a spawned task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(Settlement::Pending);

        tokio::spawn(async move {
            let settled = match AssertUnwindSafe(future).catch_unwind().await {
                Ok(Ok(value)) => Settlement::Fulfilled(value),
                Ok(Err(err)) => Settlement::Rejected(ResourceError::Rejected(Arc::new(err))),
                Err(panic) => Settlement::Rejected(ResourceError::Panicked(panic_message(&*panic))),
            };
            tx.send_replace(settled);
        });

        Self { state: rx }
    }

    /// A resource that is already fulfilled.
    pub fn fulfilled(value: T) -> Self {
        let (_tx, rx) = watch::channel(Settlement::Fulfilled(value));
        Self { state: rx }
    }

    /// A resource that is already rejected.
    pub fn rejected(error: anyhow::Error) -> Self {
        let (_tx, rx) = watch::channel(Settlement::Rejected(ResourceError::Rejected(Arc::new(error))));
        Self { state: rx }
    }

    /// Current status.
    pub fn status(&self) -> ResourceStatus {
        self.state.borrow().status()
    }

    /// Whether the resource has settled.
    pub fn is_settled(&self) -> bool {
        self.status() != ResourceStatus::Pending
    }

    /// The value, if fulfilled.
    pub fn value(&self) -> Option<T> {
        match &*self.state.borrow() {
            Settlement::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// The rejection reason, if rejected.
    pub fn error(&self) -> Option<ResourceError> {
        match &*self.state.borrow() {
            Settlement::Rejected(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Wait for the resource to settle.
    ///
    /// This is the suspension point for rendering: a subtree awaiting an
    /// unsettled resource is pending until the fetch completes.
    pub async fn read(&self) -> Result<T, ResourceError> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|s| !matches!(s, Settlement::Pending))
            .await
            .map_err(|_| ResourceError::Dropped)?;

        match &*settled {
            Settlement::Fulfilled(value) => Ok(value.clone()),
            Settlement::Rejected(err) => Err(err.clone()),
            Settlement::Pending => Err(ResourceError::Dropped),
        }
    }
}

impl Resource<serde_json::Value> {
    /// Wait for the resource and decode its JSON value.
    pub async fn read_as<T: DeserializeOwned>(&self) -> Result<T, ResourceError> {
        let value = self.read().await?;
        serde_json::from_value(value).map_err(|e| ResourceError::Decode(e.to_string()))
    }
}

/// Best-effort message from a caught panic payload.
pub fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resource_fulfills_once() {
        let resource = Resource::new(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(42u32)
        });

        assert_eq!(resource.status(), ResourceStatus::Pending);
        assert_eq!(resource.read().await.unwrap(), 42);
        assert_eq!(resource.status(), ResourceStatus::Fulfilled);
        assert_eq!(resource.value(), Some(42));
        assert!(resource.error().is_none());
    }

    #[tokio::test]
    async fn test_resource_rejection_is_captured_until_read() {
        let resource: Resource<u32> = Resource::new(async { Err(anyhow::anyhow!("upstream 503")) });

        let err = resource.read().await.unwrap_err();
        assert!(err.to_string().contains("upstream 503"));
        assert_eq!(resource.status(), ResourceStatus::Rejected);
        assert!(resource.value().is_none());
    }

    #[tokio::test]
    async fn test_resource_panic_becomes_rejection() {
        let resource: Resource<u32> = Resource::new(async {
            if true {
                panic!("fetcher exploded");
            }
            Ok(0)
        });

        let err = resource.read().await.unwrap_err();
        assert!(matches!(err, ResourceError::Panicked(ref msg) if msg.contains("fetcher exploded")));
    }

    #[tokio::test]
    async fn test_clones_share_settlement() {
        let resource = Resource::new(async { Ok("shared".to_string()) });
        let clone = resource.clone();

        assert_eq!(resource.read().await.unwrap(), "shared");
        assert_eq!(clone.status(), ResourceStatus::Fulfilled);
    }

    #[tokio::test]
    async fn test_fulfilled_resource_reads_immediately() {
        let resource = Resource::fulfilled(serde_json::json!({"id": 1}));

        assert_eq!(resource.status(), ResourceStatus::Fulfilled);

        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Post {
            id: u32,
        }
        assert_eq!(resource.read_as::<Post>().await.unwrap(), Post { id: 1 });
    }

    #[tokio::test]
    async fn test_read_as_decode_error() {
        let resource = Resource::fulfilled(serde_json::json!("not a number"));

        let err = resource.read_as::<u32>().await.unwrap_err();
        assert!(matches!(err, ResourceError::Decode(_)));
    }

    #[tokio::test]
    async fn test_rejected_constructor() {
        let resource: Resource<u8> = Resource::rejected(anyhow::anyhow!("nope"));

        assert_eq!(resource.status(), ResourceStatus::Rejected);
        assert!(resource.read().await.is_err());
    }
}
