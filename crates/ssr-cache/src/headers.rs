//! Response cache headers.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use ssr_core::ResponseMode;

/// Header names used on SSR responses.
pub mod header_names {
    /// Cache policy.
    pub const CACHE_CONTROL: &str = "cache-control";
    /// Content hash.
    pub const ETAG: &str = "etag";
    /// Conditional request hash.
    pub const IF_NONE_MATCH: &str = "if-none-match";
    /// Server timing marks.
    pub const SERVER_TIMING: &str = "server-timing";
}

/// Who may store the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheScope {
    /// CDN and browser.
    Public,
    /// Browser only.
    #[default]
    Private,
}

impl CacheScope {
    /// Cache-Control directive for this scope.
    pub fn directive(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Cache-Control policy for a rendered document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    /// Cache scope.
    pub scope: CacheScope,
    /// `max-age`; `None` means revalidate every time (`no-cache`).
    pub max_age: Option<Duration>,
    /// Stale-while-revalidate window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_while_revalidate: Option<Duration>,
    /// The body never changes at this URL.
    pub immutable: bool,
}

/// One year, the conventional ceiling for immutable documents.
pub const STATIC_MAX_AGE: Duration = Duration::from_secs(31_536_000);
/// Freshness of a partially prerendered shell.
pub const PPR_MAX_AGE: Duration = Duration::from_secs(60);
/// Window in which a stale partially prerendered shell may be served.
pub const PPR_STALE_WHILE_REVALIDATE: Duration = Duration::from_secs(3600);

impl CacheControl {
    /// Per-request, never shared.
    pub fn private_no_cache() -> Self {
        Self {
            scope: CacheScope::Private,
            max_age: None,
            stale_while_revalidate: None,
            immutable: false,
        }
    }

    /// Shared cache for `ttl`.
    pub fn public(ttl: Duration) -> Self {
        Self {
            scope: CacheScope::Public,
            max_age: Some(ttl),
            stale_while_revalidate: None,
            immutable: false,
        }
    }

    /// Policy for a response mode.
    ///
    /// Static documents are immutable, partially prerendered ones are short
    /// lived with background revalidation, and streamed ones are private.
    pub fn for_mode(mode: ResponseMode) -> Self {
        match mode {
            ResponseMode::Static => Self::public(STATIC_MAX_AGE).immutable(),
            ResponseMode::Ppr => Self::public(PPR_MAX_AGE).with_swr(PPR_STALE_WHILE_REVALIDATE),
            ResponseMode::Stream => Self::private_no_cache(),
        }
    }

    /// Add a stale-while-revalidate window.
    pub fn with_swr(mut self, window: Duration) -> Self {
        self.stale_while_revalidate = Some(window);
        self
    }

    /// Mark as immutable.
    pub fn immutable(mut self) -> Self {
        self.immutable = true;
        self
    }

    /// Header value.
    pub fn header_value(&self) -> String {
        let mut parts = vec![self.scope.directive().to_string()];

        match self.max_age {
            Some(age) => parts.push(format!("max-age={}", age.as_secs())),
            None => parts.push("no-cache".to_string()),
        }

        if let Some(swr) = self.stale_while_revalidate {
            parts.push(format!("stale-while-revalidate={}", swr.as_secs()));
        }

        if self.immutable {
            parts.push("immutable".to_string());
        }

        parts.join(", ")
    }
}

/// Builder for the cache-related response headers.
#[derive(Debug, Default)]
pub struct CacheHeadersBuilder {
    cache_control: Option<String>,
    etag: Option<String>,
    server_timing: Option<String>,
}

impl CacheHeadersBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set Cache-Control from a policy.
    pub fn cache_control(mut self, policy: &CacheControl) -> Self {
        self.cache_control = Some(policy.header_value());
        self
    }

    /// Set the ETag (already quoted, see [`generate_etag`]).
    pub fn etag(mut self, value: impl Into<String>) -> Self {
        self.etag = Some(value.into());
        self
    }

    /// Set Server-Timing. Empty values are skipped.
    pub fn server_timing(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.server_timing = Some(value);
        }
        self
    }

    /// Build the headers.
    pub fn build(self) -> Vec<(String, String)> {
        let mut headers = Vec::new();

        if let Some(cc) = self.cache_control {
            headers.push((header_names::CACHE_CONTROL.to_string(), cc));
        }

        if let Some(etag) = self.etag {
            headers.push((header_names::ETAG.to_string(), etag));
        }

        if let Some(timing) = self.server_timing {
            headers.push((header_names::SERVER_TIMING.to_string(), timing));
        }

        headers
    }
}

/// Strong ETag over the body: quoted, SHA-256, base64url.
pub fn generate_etag(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    format!("\"{}\"", URL_SAFE_NO_PAD.encode(digest))
}

/// Whether an `If-None-Match` value matches `etag`.
pub fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match
        .split(',')
        .map(str::trim)
        .map(|tag| tag.strip_prefix("W/").unwrap_or(tag))
        .any(|tag| tag == "*" || tag == etag)
}
