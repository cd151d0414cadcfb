//! The hydration payload handed to the client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ssr_cache::ResourceCache;
use ssr_core::RouteDescriptor;
use ssr_security::{escape_json_for_script, Nonce};

/// Route table plus the settled cache snapshot.
///
/// The client reads `resources` back into its own cache so nothing
/// fetched on the server is fetched again during hydration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HydrationPayload {
    /// Routes the client needs for navigation.
    pub routes: Vec<RouteDescriptor>,
    /// Fulfilled resources by cache key.
    pub resources: Map<String, Value>,
}

impl HydrationPayload {
    /// Create a payload.
    pub fn new(routes: Vec<RouteDescriptor>, resources: Map<String, Value>) -> Self {
        Self { routes, resources }
    }

    /// Snapshot `cache` alongside `routes`.
    pub fn from_cache(routes: Vec<RouteDescriptor>, cache: &ResourceCache) -> Self {
        Self::new(routes, cache.serialize())
    }

    /// JSON safe to embed inside a `<script>` element.
    pub fn to_script_json(&self) -> Result<String, serde_json::Error> {
        Ok(escape_json_for_script(&serde_json::to_string(self)?))
    }

    /// Inline script assigning the payload to `window[global]`.
    pub fn render_script(&self, global: &str, nonce: &Nonce) -> Result<String, serde_json::Error> {
        let global = escape_json_for_script(&serde_json::to_string(global)?);
        Ok(format!(
            "<script {}>window[{}]={};</script>\n",
            nonce.attribute(),
            global,
            self.to_script_json()?
        ))
    }
}
