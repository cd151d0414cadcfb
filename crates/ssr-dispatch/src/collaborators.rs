//! Collaborators the dispatcher consumes: component loading and asset lookup.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ssr_streaming::Component;

/// Resolves a route's logical file identifier to a component.
pub trait ComponentLoader: Send + Sync {
    /// The component for `file_path`, if one is registered.
    fn load(&self, file_path: &str) -> Option<Arc<dyn Component>>;
}

/// Maps logical asset names to their final, usually hashed, paths.
pub trait BuildManifest: Send + Sync {
    /// The served path for `name`.
    fn resolve(&self, name: &str) -> Option<String>;
}

/// Components registered by file identifier.
#[derive(Clone, Default)]
pub struct ComponentRegistry {
    components: HashMap<String, Arc<dyn Component>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `component` under `file_path`.
    pub fn with_component(mut self, file_path: impl Into<String>, component: Arc<dyn Component>) -> Self {
        self.components.insert(file_path.into(), component);
        self
    }

    /// Number of registered components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

impl ComponentLoader for ComponentRegistry {
    fn load(&self, file_path: &str) -> Option<Arc<dyn Component>> {
        self.components.get(file_path).cloned()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.components.keys().collect();
        keys.sort();
        f.debug_struct("ComponentRegistry").field("components", &keys).finish()
    }
}

/// In-memory build manifest.
///
/// Names without an entry resolve under `base_path` unchanged, which is
/// what an unhashed development build serves.
#[derive(Debug, Clone)]
pub struct StaticManifest {
    entries: HashMap<String, String>,
    base_path: Option<String>,
}

impl StaticManifest {
    /// A manifest that only knows explicit entries.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            base_path: None,
        }
    }

    /// A manifest serving unknown names from `base_path`.
    pub fn passthrough(base_path: impl Into<String>) -> Self {
        Self {
            entries: HashMap::new(),
            base_path: Some(base_path.into()),
        }
    }

    /// Add an entry.
    pub fn with_entry(mut self, name: impl Into<String>, path: impl Into<String>) -> Self {
        self.entries.insert(name.into(), path.into());
        self
    }

    /// Load entries from a JSON object of `name -> path`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let entries: HashMap<String, String> = serde_json::from_str(json)?;
        Ok(Self {
            entries,
            base_path: None,
        })
    }
}

impl Default for StaticManifest {
    fn default() -> Self {
        Self::passthrough("/")
    }
}

impl BuildManifest for StaticManifest {
    fn resolve(&self, name: &str) -> Option<String> {
        if let Some(path) = self.entries.get(name) {
            return Some(path.clone());
        }
        self.base_path
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), name.trim_start_matches('/')))
    }
}
