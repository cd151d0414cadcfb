//! Per-request context.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use ssr_security::Nonce;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::TimingMarks;

/// Header carrying the request trace id.
pub const X_REQUEST_ID: &str = "x-request-id";
/// W3C trace context header.
pub const TRACEPARENT: &str = "traceparent";

/// Unique request identifier for tracing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generate a new request ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Create from an existing ID string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract the trace id from a W3C `traceparent` header.
    ///
    /// Format: `{version}-{trace_id}-{span_id}-{flags}`
    /// Example: `00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
    pub fn from_traceparent(header: &str) -> Option<Self> {
        let parts: Vec<&str> = header.trim().split('-').collect();
        if parts.len() != 4 || parts[0] != "00" {
            return None;
        }

        let trace_id = parts[1];
        let valid = trace_id.len() == 32
            && trace_id.chars().all(|c| c.is_ascii_hexdigit())
            && trace_id.chars().any(|c| c != '0');
        valid.then(|| Self(trace_id.to_ascii_lowercase()))
    }

    /// Get the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the response body is produced and cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Stream the shell first, then suspended subtrees as they settle.
    #[default]
    Stream,
    /// Render fully before sending; long-lived cacheable output.
    Static,
    /// Partially prerendered; short-lived shared caching.
    Ppr,
}

impl ResponseMode {
    /// Parse from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stream" => Some(Self::Stream),
            "static" => Some(Self::Static),
            "ppr" => Some(Self::Ppr),
            _ => None,
        }
    }

    /// Whether the body is streamed incrementally.
    pub fn is_streaming(&self) -> bool {
        !matches!(self, Self::Static)
    }
}

impl std::fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream => write!(f, "stream"),
            Self::Static => write!(f, "static"),
            Self::Ppr => write!(f, "ppr"),
        }
    }
}

/// Context owned by the request producing one response.
///
/// Built once at the start of request handling. The shape is fixed after
/// construction; only `marks` grows, by appending.
#[derive(Debug)]
pub struct RequestContext {
    /// Opaque trace identifier.
    pub id: RequestId,
    /// Nonce authorizing this response's inline scripts.
    pub nonce: Nonce,
    /// Ordered timing marks.
    pub marks: TimingMarks,
    /// How the response is produced.
    pub mode: ResponseMode,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a context with a fresh id, nonce and cancellation signal.
    pub fn new(mode: ResponseMode) -> Self {
        Self {
            id: RequestId::generate(),
            nonce: Nonce::generate(),
            marks: TimingMarks::new(),
            mode,
            cancellation: CancellationToken::new(),
        }
    }

    /// Create a context for an inbound request, reusing its trace id.
    ///
    /// The id comes from `traceparent` if valid, else `x-request-id`,
    /// else a freshly generated one.
    pub fn from_request<B>(request: &http::Request<B>, mode: ResponseMode) -> Self {
        let headers = request.headers();
        let id = headers
            .get(TRACEPARENT)
            .and_then(|v| v.to_str().ok())
            .and_then(RequestId::from_traceparent)
            .or_else(|| {
                headers
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .map(str::trim)
                    .filter(|v| !v.is_empty() && v.len() <= 128)
                    .map(RequestId::from_string)
            })
            .unwrap_or_else(RequestId::generate);

        Self::new(mode).with_id(id)
    }

    /// Override the request id.
    pub fn with_id(mut self, id: RequestId) -> Self {
        self.id = id;
        self
    }

    /// Override the nonce.
    pub fn with_nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = nonce;
        self
    }

    /// Use an externally owned cancellation signal.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// When the request started.
    pub fn start_time(&self) -> Instant {
        self.marks.start()
    }

    /// Elapsed time since the request started.
    pub fn elapsed(&self) -> Duration {
        self.marks.elapsed()
    }

    /// Record a named timing mark.
    pub fn mark(&mut self, name: &str) -> Duration {
        self.marks.mark(name)
    }

    /// Cancellation signal; cancel it when the client disconnects.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the request has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}
