//! Error taxonomy for the render path.

use std::sync::Arc;
use std::time::Duration;

/// Errors that can occur while producing a response.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RenderError {
    /// No route matched the request path.
    #[error("no route matches {0}")]
    RouteNotFound(String),

    /// Rendering failed before the shell was ready. Nothing was sent.
    #[error("shell render failed: {0}")]
    ShellRender(Arc<anyhow::Error>),

    /// The shell was not produced within the configured timeout.
    #[error("shell not ready within {0:?}")]
    ShellTimeout(Duration),

    /// Rendering failed after bytes were committed to the client.
    #[error("stream render failed: {0}")]
    StreamRender(Arc<anyhow::Error>),

    /// Rendering was aborted.
    #[error("render aborted")]
    Aborted,

    /// Any other failure reaching the page boundary.
    #[error("unhandled error: {0}")]
    Unhandled(Arc<anyhow::Error>),
}

impl RenderError {
    /// Wrap an error raised before the shell was flushed.
    pub fn shell(err: anyhow::Error) -> Self {
        Self::ShellRender(Arc::new(err))
    }

    /// Wrap an error raised after the shell was flushed.
    pub fn stream(err: anyhow::Error) -> Self {
        Self::StreamRender(Arc::new(err))
    }

    /// Wrap any other error.
    pub fn unhandled(err: anyhow::Error) -> Self {
        Self::Unhandled(Arc::new(err))
    }

    /// Whether bytes may already have reached the client.
    ///
    /// Committed errors can only be reported; uncommitted ones can be
    /// replaced by a full error document.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::StreamRender(_))
    }

    /// HTTP status for an error document replacing the response.
    pub fn status(&self) -> http::StatusCode {
        match self {
            Self::RouteNotFound(_) => http::StatusCode::NOT_FOUND,
            _ => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Debug rendering including the cause chain.
    pub fn detail(&self) -> String {
        match self {
            Self::ShellRender(e) | Self::StreamRender(e) | Self::Unhandled(e) => format!("{:?}", e),
            other => other.to_string(),
        }
    }
}
