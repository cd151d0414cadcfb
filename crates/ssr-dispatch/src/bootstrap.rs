//! Bootstrap script list in its fixed load order.

use ssr_core::BootstrapConfig;
use ssr_security::{escape_html, Nonce};

use crate::collaborators::BuildManifest;
use crate::error::DispatchError;

/// The three bootstrap chunks.
///
/// Later chunks reference symbols defined by earlier ones, so the order
/// of [`BootstrapChunk::ORDER`] is the only valid load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapChunk {
    /// Module loader.
    Runtime,
    /// Shared vendor code.
    Vendor,
    /// Application entry.
    App,
}

impl BootstrapChunk {
    /// Load order.
    pub const ORDER: [BootstrapChunk; 3] = [Self::Runtime, Self::Vendor, Self::App];

    /// Logical asset name for this chunk.
    pub fn logical_name<'a>(&self, config: &'a BootstrapConfig) -> &'a str {
        match self {
            Self::Runtime => &config.runtime,
            Self::Vendor => &config.vendor,
            Self::App => &config.app,
        }
    }
}

/// Resolved bootstrap script sources, always in load order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapScripts {
    sources: Vec<String>,
}

impl BootstrapScripts {
    /// Resolve every chunk through `manifest`.
    pub fn resolve(config: &BootstrapConfig, manifest: &dyn BuildManifest) -> Result<Self, DispatchError> {
        let sources = BootstrapChunk::ORDER
            .iter()
            .map(|chunk| {
                let name = chunk.logical_name(config);
                manifest
                    .resolve(name)
                    .ok_or_else(|| DispatchError::MissingAsset(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sources })
    }

    /// Script sources in load order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Script tags in load order. `defer` keeps document order on the client.
    pub fn render(&self, nonce: &Nonce) -> String {
        self.sources
            .iter()
            .map(|src| {
                format!(
                    "<script {} src=\"{}\" defer></script>\n",
                    nonce.attribute(),
                    escape_html(src)
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticManifest;

    #[test]
    fn test_resolve_keeps_load_order() {
        let manifest = StaticManifest::new()
            .with_entry("app.js", "/a.3.js")
            .with_entry("runtime.js", "/r.1.js")
            .with_entry("vendor.js", "/v.2.js");

        let scripts = BootstrapScripts::resolve(&BootstrapConfig::default(), &manifest).unwrap();
        assert_eq!(scripts.sources(), ["/r.1.js", "/v.2.js", "/a.3.js"]);
    }

    #[test]
    fn test_render_orders_tags_and_carries_nonce() {
        let scripts = BootstrapScripts::resolve(&BootstrapConfig::default(), &StaticManifest::default()).unwrap();
        let html = scripts.render(&Nonce::from_string("n0nce"));

        let runtime = html.find("/runtime.js").unwrap();
        let vendor = html.find("/vendor.js").unwrap();
        let app = html.find("/app.js").unwrap();
        assert!(runtime < vendor && vendor < app);
        assert_eq!(html.matches("nonce=\"n0nce\"").count(), 3);
    }

    #[test]
    fn test_missing_chunk_is_an_error() {
        let manifest = StaticManifest::new().with_entry("runtime.js", "/r.js");

        let err = BootstrapScripts::resolve(&BootstrapConfig::default(), &manifest).unwrap_err();
        assert!(matches!(err, DispatchError::MissingAsset(name) if name == "vendor.js"));
    }
}
