//! Component-level error boundaries and error reporting.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use ssr_security::escape_html;

use crate::node::{Element, Node};

/// Attribute carrying the boundary id on the retry button.
pub const RETRY_ATTRIBUTE: &str = "data-retry-boundary";

/// When an error was caught.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderPhase {
    /// Before the shell was flushed.
    Shell,
    /// After the shell was flushed.
    Stream,
}

/// The error a boundary caught, as seen by its fallback.
#[derive(Debug, Clone)]
pub struct BoundaryError {
    /// Id of the catching boundary.
    pub boundary_id: String,
    /// Top-level error message.
    pub message: String,
}

type FallbackFn = Arc<dyn Fn(&BoundaryError) -> Node + Send + Sync>;

/// Catches errors raised while rendering its children.
///
/// On error the children's output is discarded, including any suspense
/// regions registered inside them, the error is reported, and the fallback
/// is rendered instead. Errors raised after the shell by a suspense region
/// inside the boundary replace only that region with the fallback.
#[derive(Clone)]
pub struct ErrorBoundary {
    id: Option<String>,
    children: Vec<Node>,
    fallback: Option<FallbackFn>,
}

impl ErrorBoundary {
    /// Wrap `children` with the default fallback.
    pub fn new(children: impl IntoIterator<Item = Node>) -> Self {
        Self {
            id: None,
            children: children.into_iter().collect(),
            fallback: None,
        }
    }

    /// Use a fixed id instead of a generated one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Use a custom fallback.
    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(&BoundaryError) -> Node + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(fallback));
        self
    }

    /// The fixed id, if one was set.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub(crate) fn into_parts(self) -> (Option<String>, Vec<Node>, Option<FallbackFn>) {
        (self.id, self.children, self.fallback)
    }
}

/// Fallback shown when a boundary has no custom one.
///
/// The button is a retry affordance: client code re-renders the boundary
/// whose id it carries.
pub fn default_fallback(error: &BoundaryError) -> Node {
    Element::new("div")
        .attr("role", "alert")
        .attr("data-boundary", error.boundary_id.clone())
        .child(Element::new("p").text("Something went wrong."))
        .child(
            Element::new("button")
                .attr("type", "button")
                .attr(RETRY_ATTRIBUTE, error.boundary_id.clone())
                .text("Try again"),
        )
        .into()
}

/// A boundary on the render stack.
pub(crate) struct BoundaryFrame {
    pub(crate) id: String,
    fallback: Option<FallbackFn>,
    pub(crate) parent: Option<Arc<BoundaryFrame>>,
}

impl BoundaryFrame {
    pub(crate) fn new(id: String, fallback: Option<FallbackFn>, parent: Option<Arc<BoundaryFrame>>) -> Self {
        Self { id, fallback, parent }
    }

    pub(crate) fn fallback_for(&self, error: &anyhow::Error) -> Node {
        let caught = BoundaryError {
            boundary_id: self.id.clone(),
            message: error.to_string(),
        };
        match &self.fallback {
            Some(fallback) => fallback(&caught),
            None => default_fallback(&caught),
        }
    }
}

impl fmt::Debug for BoundaryFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundaryFrame").field("id", &self.id).finish()
    }
}

/// A caught render error.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    /// Request the error belongs to.
    pub request_id: String,
    /// Catching boundary, or `None` if nothing caught it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary_id: Option<String>,
    /// When it was caught.
    pub phase: RenderPhase,
    /// Top-level message.
    pub message: String,
    /// Message plus cause chain.
    pub detail: String,
}

impl ErrorReport {
    /// Build a report for `error`.
    pub fn new(request_id: impl Into<String>, phase: RenderPhase, error: &anyhow::Error) -> Self {
        Self {
            request_id: request_id.into(),
            boundary_id: None,
            phase,
            message: error.to_string(),
            detail: format!("{:?}", error),
        }
    }

    /// Set the catching boundary.
    pub fn with_boundary(mut self, id: impl Into<String>) -> Self {
        self.boundary_id = Some(id.into());
        self
    }

    /// Escaped message for embedding in HTML.
    pub fn message_html(&self) -> String {
        escape_html(&self.message)
    }
}

/// Receives errors caught during rendering.
pub trait ErrorReporter: Send + Sync + fmt::Debug {
    /// Record one caught error.
    fn report(&self, report: &ErrorReport);
}

/// Reports errors as `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, report: &ErrorReport) {
        tracing::error!(
            request_id = %report.request_id,
            boundary = report.boundary_id.as_deref().unwrap_or("-"),
            phase = ?report.phase,
            error = %report.message,
            "render error caught"
        );
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingReporter {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports received so far.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, report: &ErrorReport) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }
}
