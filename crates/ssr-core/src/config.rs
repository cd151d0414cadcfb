//! Engine configuration.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::context::ResponseMode;

/// Environment variable selecting production or development behaviour.
pub const ENV_ENVIRONMENT: &str = "SSR_ENV";
/// Environment variable forcing a renderer.
pub const ENV_RENDERER: &str = "SSR_RENDERER";
/// Environment variable selecting the reveal strategy.
pub const ENV_REVEAL: &str = "SSR_REVEAL";
/// Environment variable overriding the shell timeout.
pub const ENV_SHELL_TIMEOUT_MS: &str = "SSR_SHELL_TIMEOUT_MS";

/// Variables whose presence marks a host without pipe-style response bodies.
pub const NON_PIPE_HOST_MARKERS: &[&str] = &[
    "SPIN_COMPONENT_ROUTE",
    "DENO_DEPLOYMENT_ID",
    "CF_PAGES",
    "FASTLY_SERVICE_VERSION",
    "VERCEL_EDGE",
];

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML for [`RenderConfig`].
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The document is not valid JSON for [`RenderConfig`].
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// A setting holds a value that does not parse.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue {
        /// Setting that was rejected.
        key: String,
        /// Offending value as written.
        value: String,
    },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Opaque error pages, no stack traces.
    #[default]
    Production,
    /// Error pages include stack traces and the request path.
    Development,
}

impl Environment {
    /// Parse from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "development" | "dev" | "test" => Some(Self::Development),
            _ => None,
        }
    }

    /// Whether error details may be shown to the client.
    pub fn exposes_errors(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Which streaming renderer drives the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Push chunks into the response's byte sink.
    #[default]
    Pipe,
    /// Produce a readable stream the caller pulls from.
    Readable,
}

impl RendererKind {
    /// Parse from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pipe" | "node" => Some(Self::Pipe),
            "readable" | "web" | "stream" => Some(Self::Readable),
            _ => None,
        }
    }

    /// Choose a renderer at composition time.
    ///
    /// An explicit override wins. Otherwise a host advertising a
    /// non-pipe environment gets the readable variant, and everything
    /// else gets the pipe variant.
    pub fn select(explicit: Option<RendererKind>, host: &HostEnv) -> RendererKind {
        if let Some(kind) = explicit {
            return kind;
        }
        if NON_PIPE_HOST_MARKERS.iter().any(|m| host.contains(m)) {
            RendererKind::Readable
        } else {
            RendererKind::Pipe
        }
    }
}

impl std::fmt::Display for RendererKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pipe => write!(f, "pipe"),
            Self::Readable => write!(f, "readable"),
        }
    }
}

/// When resolved suspended subtrees are sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RevealStrategy {
    /// Send each subtree as soon as it settles.
    #[default]
    Progressive,
    /// Hold every subtree until all have settled, then send in document order.
    Batched,
}

impl RevealStrategy {
    /// Parse from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "progressive" => Some(Self::Progressive),
            "batched" => Some(Self::Batched),
            _ => None,
        }
    }
}

/// Logical names of the bootstrap chunks, in load order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Runtime chunk (module loader).
    pub runtime: String,
    /// Vendor/shared chunk.
    pub vendor: String,
    /// Application entry chunk.
    pub app: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            runtime: "runtime.js".to_string(),
            vendor: "vendor.js".to_string(),
            app: "app.js".to_string(),
        }
    }
}

/// Snapshot of host environment variables.
///
/// Captured once at composition time and passed explicitly, so nothing on
/// the request path reads process globals.
#[derive(Debug, Clone, Default)]
pub struct HostEnv {
    vars: HashMap<String, String>,
}

impl HostEnv {
    /// Capture the current process environment.
    pub fn capture() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build from explicit pairs.
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            vars: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Get a variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|s| s.as_str())
    }

    /// Whether a variable is set.
    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }
}

/// Configuration for the render engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Application name.
    pub app_name: String,
    /// Default document title.
    pub title: String,
    /// Id of the element the application hydrates into.
    pub root_id: String,
    /// Stylesheets linked from the document head.
    pub stylesheets: Vec<String>,
    /// Deployment environment.
    pub environment: Environment,
    /// Explicit renderer override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<RendererKind>,
    /// Reveal strategy for suspended subtrees.
    pub reveal: RevealStrategy,
    /// Default response mode.
    pub response_mode: ResponseMode,
    /// Maximum time to produce the shell (0 disables).
    pub shell_timeout_ms: u64,
    /// Default resource cache TTL in seconds.
    pub cache_ttl_secs: u64,
    /// Bootstrap chunk names.
    pub bootstrap: BootstrapConfig,
    /// Global variable holding the hydration payload on the client.
    pub hydration_global: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            app_name: "ssr-app".to_string(),
            title: "App".to_string(),
            root_id: "root".to_string(),
            stylesheets: Vec::new(),
            environment: Environment::Production,
            renderer: None,
            reveal: RevealStrategy::Progressive,
            response_mode: ResponseMode::Stream,
            shell_timeout_ms: 10_000,
            cache_ttl_secs: 300,
            bootstrap: BootstrapConfig::default(),
            hydration_global: "__SSR_DATA__".to_string(),
        }
    }
}

impl RenderConfig {
    /// Create a new configuration with the given app name.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            ..Default::default()
        }
    }

    /// Load config from a file (`.json`, otherwise TOML).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        if path.extension().is_some_and(|ext| ext == "json") {
            Ok(serde_json::from_str(&content)?)
        } else {
            Self::from_toml_str(&content)
        }
    }

    /// Parse TOML configuration.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `SSR_*` overrides from the host environment.
    pub fn with_env_overrides(mut self, host: &HostEnv) -> Result<Self, ConfigError> {
        if let Some(value) = host.get(ENV_ENVIRONMENT) {
            self.environment = Environment::parse(value).ok_or_else(|| invalid(ENV_ENVIRONMENT, value))?;
        }
        if let Some(value) = host.get(ENV_RENDERER) {
            self.renderer = Some(RendererKind::parse(value).ok_or_else(|| invalid(ENV_RENDERER, value))?);
        }
        if let Some(value) = host.get(ENV_REVEAL) {
            self.reveal = RevealStrategy::parse(value).ok_or_else(|| invalid(ENV_REVEAL, value))?;
        }
        if let Some(value) = host.get(ENV_SHELL_TIMEOUT_MS) {
            self.shell_timeout_ms = value
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_SHELL_TIMEOUT_MS, value))?;
        }
        Ok(self)
    }

    /// Set the default page title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Add a stylesheet.
    pub fn with_stylesheet(mut self, href: impl Into<String>) -> Self {
        self.stylesheets.push(href.into());
        self
    }

    /// Set the environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Force a renderer.
    pub fn with_renderer(mut self, kind: RendererKind) -> Self {
        self.renderer = Some(kind);
        self
    }

    /// Set the reveal strategy.
    pub fn with_reveal(mut self, reveal: RevealStrategy) -> Self {
        self.reveal = reveal;
        self
    }

    /// Set the default response mode.
    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = mode;
        self
    }

    /// Set the shell timeout.
    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the default cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl_secs = ttl.as_secs();
        self
    }

    /// Shell timeout, if enforced.
    pub fn shell_timeout(&self) -> Option<Duration> {
        (self.shell_timeout_ms > 0).then(|| Duration::from_millis(self.shell_timeout_ms))
    }

    /// Default cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
