//! Response headers, computed from the request context and applied as one batch.

use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderMap, HeaderName, HeaderValue};
use ssr_cache::{header_names, CacheControl, CacheHeadersBuilder};
use ssr_core::{RequestContext, ResponseMode, X_REQUEST_ID};
use ssr_security::{ContentSecurityPolicy, CONTENT_SECURITY_POLICY};

use crate::error::DispatchError;

/// Content type of every rendered document.
pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Headers for one response, collected before anything is written.
///
/// Built from the request context at the moment the head is committed;
/// nothing is added after the first body byte.
#[derive(Debug, Clone)]
pub struct HeaderBatch {
    pairs: Vec<(String, String)>,
}

impl HeaderBatch {
    /// Headers for a rendered HTML document.
    ///
    /// CSP scoped to the request nonce, Server-Timing from the marks so
    /// far, Cache-Control by response mode and the request id.
    pub fn for_document(ctx: &RequestContext) -> Self {
        Self::document_with_policy(ctx, CacheControl::for_mode(ctx.mode))
    }

    /// Headers for an error document. Error pages are never shared-cached.
    pub fn for_error_page(ctx: &RequestContext) -> Self {
        Self::document_with_policy(ctx, CacheControl::for_mode(ResponseMode::Stream))
    }

    /// Headers for a redirect: location and request id only.
    pub fn for_redirect(ctx: &RequestContext, location: &str) -> Self {
        Self {
            pairs: vec![
                (LOCATION.as_str().to_string(), location.to_string()),
                (X_REQUEST_ID.to_string(), ctx.id.to_string()),
            ],
        }
    }

    fn document_with_policy(ctx: &RequestContext, policy: CacheControl) -> Self {
        let mut pairs = vec![
            (CONTENT_TYPE.as_str().to_string(), HTML_CONTENT_TYPE.to_string()),
            (
                CONTENT_SECURITY_POLICY.to_string(),
                ContentSecurityPolicy::for_nonce(&ctx.nonce).to_header_value(),
            ),
        ];
        pairs.extend(
            CacheHeadersBuilder::new()
                .cache_control(&policy)
                .server_timing(ctx.marks.server_timing())
                .build(),
        );
        pairs.push((X_REQUEST_ID.to_string(), ctx.id.to_string()));
        Self { pairs }
    }

    /// Add an entity tag.
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.pairs.push((header_names::ETAG.to_string(), etag.into()));
        self
    }

    /// A header value, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Encode as an `http` header map.
    pub fn into_header_map(self) -> Result<HeaderMap, DispatchError> {
        let mut map = HeaderMap::with_capacity(self.pairs.len());
        for (name, value) in self.pairs {
            let invalid = || DispatchError::InvalidHeader {
                name: name.clone(),
                value: value.clone(),
            };
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(&value).map_err(|_| invalid())?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}
