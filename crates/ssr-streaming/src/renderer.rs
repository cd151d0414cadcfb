//! The renderer contract shared by both transports.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use ssr_core::{RenderError, RendererKind, RevealStrategy};
use ssr_security::Nonce;
use tokio_util::sync::CancellationToken;

use crate::boundary::{ErrorReporter, TracingReporter};
use crate::lifecycle::{AbortHandle, LifecycleSnapshot};
use crate::node::Node;
use crate::pipe::PipeableStream;
use crate::readable::ReadableStream;
use crate::scope::Scope;
use crate::shell::Document;
use crate::sink::{ResponseSink, SinkError};

/// Produces the closing markup once every region has settled.
pub type TailFn = Box<dyn FnOnce() -> String + Send>;

/// Everything a renderer needs for one response.
pub struct RenderJob {
    /// The tree to render.
    pub tree: Node,
    /// Document around the tree.
    pub document: Document,
    /// Scope handed to components.
    pub scope: Scope,
    /// Nonce for every inline script.
    pub nonce: Nonce,
    /// How settled regions are released.
    pub reveal: RevealStrategy,
    /// Receives caught errors.
    pub reporter: Arc<dyn ErrorReporter>,
    /// Request-level cancellation; firing it aborts the render.
    pub cancellation: CancellationToken,
    /// Closing markup, evaluated at all-ready.
    pub tail: Option<TailFn>,
}

impl RenderJob {
    /// A job with a fresh nonce and default settings.
    pub fn new(tree: Node, scope: Scope) -> Self {
        Self {
            tree,
            document: Document::default(),
            scope,
            nonce: Nonce::generate(),
            reveal: RevealStrategy::default(),
            reporter: Arc::new(TracingReporter),
            cancellation: CancellationToken::new(),
            tail: None,
        }
    }

    /// Set the document.
    pub fn with_document(mut self, document: Document) -> Self {
        self.document = document;
        self
    }

    /// Set the nonce.
    pub fn with_nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = nonce;
        self
    }

    /// Set the reveal strategy.
    pub fn with_reveal(mut self, reveal: RevealStrategy) -> Self {
        self.reveal = reveal;
        self
    }

    /// Set the error reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Tie the render to a request's cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Set the closing markup producer.
    pub fn with_tail<F>(mut self, tail: F) -> Self
    where
        F: FnOnce() -> String + Send + 'static,
    {
        self.tail = Some(Box::new(tail));
        self
    }
}

impl fmt::Debug for RenderJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderJob")
            .field("document", &self.document)
            .field("reveal", &self.reveal)
            .field("has_tail", &self.tail.is_some())
            .finish_non_exhaustive()
    }
}

/// How forwarding ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// Every chunk was written and the sink finished.
    Completed,
    /// The render was aborted; nothing was written after the abort.
    Aborted,
}

/// A render in progress.
///
/// Lifecycle is ordered: shell-ready precedes or coincides with all-ready,
/// and an abort at any point stops further writes.
#[async_trait]
pub trait StreamResult: Send + Sync {
    /// Which transport this is.
    fn kind(&self) -> RendererKind;

    /// Resolves once the shell is produced.
    ///
    /// An error means nothing was committed and the caller may substitute a
    /// whole error document.
    async fn shell_ready(&self) -> Result<(), RenderError>;

    /// Resolves once every suspended region has settled.
    async fn all_ready(&self) -> Result<(), RenderError>;

    /// Write the body into `sink` until done or aborted.
    ///
    /// The sink's head must already be committed.
    async fn forward(&mut self, sink: &mut dyn ResponseSink) -> Result<ForwardOutcome, SinkError>;

    /// Switch that aborts this render.
    fn abort_handle(&self) -> AbortHandle;

    /// Abort the render. Never fails.
    fn abort(&self) {
        self.abort_handle().abort();
    }

    /// Current lifecycle state.
    fn lifecycle(&self) -> LifecycleSnapshot;
}

/// Starts renders on one transport.
pub trait StreamRenderer: Send + Sync + fmt::Debug {
    /// Which transport this renderer uses.
    fn kind(&self) -> RendererKind;

    /// Start rendering `job`. Must be called from within a Tokio runtime.
    fn render(&self, job: RenderJob) -> Box<dyn StreamResult>;
}

/// Renderer writing into a response sink as chunks are produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipeRenderer;

impl StreamRenderer for PipeRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Pipe
    }

    fn render(&self, job: RenderJob) -> Box<dyn StreamResult> {
        Box::new(PipeableStream::new(job))
    }
}

/// Renderer producing a pull-based stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadableRenderer;

impl StreamRenderer for ReadableRenderer {
    fn kind(&self) -> RendererKind {
        RendererKind::Readable
    }

    fn render(&self, job: RenderJob) -> Box<dyn StreamResult> {
        Box::new(ReadableStream::new(job))
    }
}

/// The renderer for `kind`.
pub fn renderer_for(kind: RendererKind) -> Arc<dyn StreamRenderer> {
    match kind {
        RendererKind::Pipe => Arc::new(PipeRenderer),
        RendererKind::Readable => Arc::new(ReadableRenderer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{ErrorBoundary, RecordingReporter, RenderPhase, RETRY_ATTRIBUTE};
    use crate::node::{component_fn, Element};
    use crate::sink::{BufferedResponse, ResponseHead};
    use ssr_cache::ResourceCache;
    use ssr_core::{LifecyclePhase, RequestId};
    use std::time::Duration;

    fn scope() -> Scope {
        Scope::new(Arc::new(ResourceCache::new()), RequestId::from_string("req-test"))
    }

    fn delayed(name: &'static str, ms: u64, text: &'static str) -> Node {
        Node::component(component_fn(name, move |_scope| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(Element::new("p").text(text).into())
        }))
    }

    fn failing(name: &'static str, ms: u64) -> Node {
        Node::component(component_fn(name, move |_scope| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Err(anyhow::anyhow!("{} exploded", name))
        }))
    }

    async fn render_all(renderer: &dyn StreamRenderer, job: RenderJob) -> (BufferedResponse, LifecycleSnapshot) {
        let mut result = renderer.render(job);
        result.shell_ready().await.unwrap();

        let mut sink = BufferedResponse::new();
        sink.send_head(ResponseHead::new(http::StatusCode::OK)).await.unwrap();
        let outcome = result.forward(&mut sink).await.unwrap();
        assert_eq!(outcome, ForwardOutcome::Completed);
        result.all_ready().await.unwrap();

        (sink, result.lifecycle())
    }

    fn both() -> [Arc<dyn StreamRenderer>; 2] {
        [renderer_for(RendererKind::Pipe), renderer_for(RendererKind::Readable)]
    }

    // === Shell Tests ===

    #[tokio::test]
    async fn test_tree_without_suspense_is_one_shell() {
        for renderer in both() {
            let tree = Element::new("h1").text("Hello <world>").into();
            let job = RenderJob::new(tree, scope())
                .with_nonce(Nonce::from_string("n"))
                .with_tail(|| "<script>tail</script>".to_string());

            let (sink, lifecycle) = render_all(renderer.as_ref(), job).await;
            let body = sink.body_string();

            assert!(body.contains(r#"<div id="root"><h1>Hello &lt;world&gt;</h1></div>"#));
            assert!(body.contains("<script>tail</script></body>"));
            assert!(!body.contains("$RC"));
            assert!(lifecycle.shell_ready_at.unwrap() <= lifecycle.all_ready_at.unwrap());
            assert!(sink.is_finished());
        }
    }

    #[tokio::test]
    async fn test_shell_error_reports_before_commit() {
        for renderer in both() {
            let result = renderer.render(RenderJob::new(failing("Layout", 0), scope()));

            let err = result.shell_ready().await.unwrap_err();
            assert!(matches!(err, RenderError::ShellRender(_)));
            assert!(!err.is_committed());
            assert!(matches!(result.lifecycle().phase, LifecyclePhase::Error(_)));
        }
    }

    #[tokio::test]
    async fn test_component_panic_is_a_shell_error() {
        let tree = Node::component(component_fn("Panics", |_scope| async {
            if true {
                panic!("bad state");
            }
            Ok(Node::empty())
        }));
        let result = PipeRenderer.render(RenderJob::new(tree, scope()));

        let err = result.shell_ready().await.unwrap_err();
        assert!(err.detail().contains("bad state"));
    }

    // === Suspense Tests ===

    #[tokio::test]
    async fn test_suspended_region_streams_after_shell() {
        for renderer in both() {
            let tree = Element::new("main")
                .child(Element::new("h1").text("Post"))
                .child(Node::suspense(Node::text("Loading..."), [delayed("Body", 50, "resolved body")]))
                .into();
            let job = RenderJob::new(tree, scope()).with_nonce(Nonce::from_string("n"));

            let (sink, lifecycle) = render_all(renderer.as_ref(), job).await;
            let body = sink.body_string();

            let shell = String::from_utf8_lossy(&sink.chunks()[0].bytes).into_owned();
            assert!(shell.contains(r#"<!--$?--><template id="B:0"></template>Loading...<!--/$-->"#));
            assert!(!shell.contains("resolved body"));

            assert!(body.contains(r#"<div hidden id="S:0"><p>resolved body</p></div>"#));
            assert!(body.contains(r#"<script nonce="n">$RC("B:0","S:0")</script>"#));
            assert!(lifecycle.shell_ready_at.unwrap() < lifecycle.all_ready_at.unwrap());
        }
    }

    #[tokio::test]
    async fn test_ready_region_is_inlined() {
        let tree = Node::suspense(Node::text("Loading..."), [Element::new("p").text("instant").into()]);

        let (sink, _) = render_all(&PipeRenderer, RenderJob::new(tree, scope())).await;
        let body = sink.body_string();

        assert!(body.contains(r#"<div id="root"><p>instant</p></div>"#));
        assert!(!body.contains("Loading..."));
    }

    #[tokio::test]
    async fn test_siblings_are_not_blocked_by_suspense() {
        let tree = Node::fragment([
            Node::suspense(Node::text("A..."), [delayed("A", 80, "a")]),
            Element::new("p").text("sibling").into(),
        ]);

        let result = PipeRenderer.render(RenderJob::new(tree, scope()));
        tokio::time::timeout(Duration::from_millis(50), result.shell_ready())
            .await
            .expect("shell should not wait for the suspended sibling")
            .unwrap();
    }

    #[tokio::test]
    async fn test_progressive_reveal_is_completion_order() {
        let tree = Node::fragment([
            Node::suspense(Node::text("slow..."), [delayed("Slow", 80, "slow")]),
            Node::suspense(Node::text("fast..."), [delayed("Fast", 10, "fast")]),
        ]);
        let job = RenderJob::new(tree, scope()).with_reveal(RevealStrategy::Progressive);

        let (sink, _) = render_all(&PipeRenderer, job).await;
        let body = sink.body_string();

        let fast = body.find(r#"id="S:1""#).unwrap();
        let slow = body.find(r#"id="S:0""#).unwrap();
        assert!(fast < slow);
        assert_eq!(body.matches("function $RC").count(), 1);
    }

    #[tokio::test]
    async fn test_batched_reveal_is_document_order_in_one_chunk() {
        let tree = Node::fragment([
            Node::suspense(Node::text("slow..."), [delayed("Slow", 60, "slow")]),
            Node::suspense(Node::text("fast..."), [delayed("Fast", 10, "fast")]),
        ]);
        let job = RenderJob::new(tree, scope()).with_reveal(RevealStrategy::Batched);

        let (sink, _) = render_all(&PipeRenderer, job).await;
        let body = sink.body_string();

        let first = body.find(r#"id="S:0""#).unwrap();
        let second = body.find(r#"id="S:1""#).unwrap();
        assert!(first < second);

        // Shell, two segments, closing: the segments are released together at the end.
        let seg0 = sink.chunks().iter().position(|c| c.bytes.windows(7).any(|w| w == b"id=\"S:0")).unwrap();
        let seg1 = sink.chunks().iter().position(|c| c.bytes.windows(7).any(|w| w == b"id=\"S:1")).unwrap();
        assert!(sink.chunks()[seg1].at >= sink.chunks()[seg0].at);
        assert!(sink.chunks()[seg0].at.duration_since(sink.chunks()[0].at) >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_nested_suspense_streams_inner_after_outer() {
        let inner = Node::suspense(Node::text("inner..."), [delayed("Inner", 40, "inner")]);
        let outer = Node::component(component_fn("Outer", move |_scope| {
            let inner = inner.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Element::new("section").child(inner).into())
            }
        }));
        let tree = Node::suspense(Node::text("outer..."), [outer]);

        let (sink, _) = render_all(&PipeRenderer, RenderJob::new(tree, scope())).await;
        let body = sink.body_string();

        let outer_segment = body.find(r#"id="S:0""#).unwrap();
        let inner_placeholder = body.find(r#"<template id="B:1">"#).unwrap();
        let inner_segment = body.find(r#"id="S:1""#).unwrap();
        assert!(outer_segment < inner_placeholder);
        assert!(inner_placeholder < inner_segment);
    }

    // === Error Boundary Tests ===

    #[tokio::test]
    async fn test_boundary_catches_shell_error() {
        let reporter = Arc::new(RecordingReporter::new());
        let tree = Node::fragment([
            ErrorBoundary::new([failing("Widget", 0)]).with_id("widget").into(),
            Element::new("p").text("still here").into(),
        ]);
        let job = RenderJob::new(tree, scope()).with_reporter(reporter.clone());

        let (sink, lifecycle) = render_all(&PipeRenderer, job).await;
        let body = sink.body_string();

        assert!(body.contains(r#"role="alert""#));
        assert!(body.contains(&format!(r#"{}="widget""#, RETRY_ATTRIBUTE)));
        assert!(body.contains("still here"));
        assert!(lifecycle.stream_errors.is_empty());

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].boundary_id.as_deref(), Some("widget"));
        assert_eq!(reports[0].phase, RenderPhase::Shell);
        assert_eq!(reports[0].request_id, "req-test");
    }

    #[tokio::test]
    async fn test_boundary_discards_regions_registered_inside() {
        let tree = ErrorBoundary::new([
            Node::suspense(Node::text("pending..."), [delayed("Slow", 30, "never shown")]),
            failing("Broken", 5),
        ])
        .with_fallback(|e| Node::text(format!("fallback: {}", e.message)))
        .into();

        let (sink, _) = render_all(&PipeRenderer, RenderJob::new(tree, scope())).await;
        let body = sink.body_string();

        assert!(body.contains("fallback: Broken exploded"));
        assert!(!body.contains("never shown"));
        assert!(!body.contains("pending..."));
    }

    #[tokio::test]
    async fn test_post_shell_error_uses_boundary_fallback() {
        let reporter = Arc::new(RecordingReporter::new());
        let tree = ErrorBoundary::new([Node::suspense(Node::text("Loading..."), [failing("Comments", 20)])])
            .with_id("comments")
            .with_fallback(|_| Node::text("Comments unavailable"))
            .into();
        let job = RenderJob::new(tree, scope()).with_reporter(reporter.clone());

        let (sink, lifecycle) = render_all(&PipeRenderer, job).await;
        let body = sink.body_string();

        assert!(body.contains(r#"<div hidden id="S:0">Comments unavailable</div>"#));
        assert!(lifecycle.stream_errors.is_empty());
        assert_eq!(reporter.reports()[0].phase, RenderPhase::Stream);
    }

    #[tokio::test]
    async fn test_boundary_inside_deferred_region_reports_stream_phase() {
        let reporter = Arc::new(RecordingReporter::new());
        let tree = Node::suspense(
            Node::text("Loading..."),
            [ErrorBoundary::new([failing("Inner", 20)])
                .with_id("inner")
                .with_fallback(|_| Node::text("inner fallback"))
                .into()],
        );
        let job = RenderJob::new(tree, scope()).with_reporter(reporter.clone());

        let (sink, lifecycle) = render_all(&PipeRenderer, job).await;

        assert!(sink.body_string().contains(r#"<div hidden id="S:0">inner fallback</div>"#));
        assert!(lifecycle.stream_errors.is_empty());

        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].boundary_id.as_deref(), Some("inner"));
        assert_eq!(reports[0].phase, RenderPhase::Stream);
    }

    #[tokio::test]
    async fn test_post_shell_error_without_boundary_keeps_fallback() {
        let reporter = Arc::new(RecordingReporter::new());
        let tree = Node::suspense(Node::text("Loading..."), [failing("Comments", 20)]);
        let job = RenderJob::new(tree, scope()).with_reporter(reporter.clone());

        let (sink, lifecycle) = render_all(&PipeRenderer, job).await;
        let body = sink.body_string();

        assert!(body.contains("Loading..."));
        assert!(!body.contains(r#"id="S:0""#));
        assert_eq!(lifecycle.stream_errors.len(), 1);
        assert!(lifecycle.stream_errors[0].is_committed());
        assert_eq!(reporter.reports()[0].boundary_id, None);
    }

    // === Abort Tests ===

    #[tokio::test]
    async fn test_abort_stops_writes() {
        for renderer in both() {
            let tree = Node::fragment([
                Node::suspense(Node::text("a..."), [delayed("A", 10, "early")]),
                Node::suspense(Node::text("b..."), [delayed("B", 200, "late-content")]),
            ]);
            let mut result = renderer.render(RenderJob::new(tree, scope()));
            result.shell_ready().await.unwrap();

            let abort = result.abort_handle();
            let aborted_at = tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                let at = std::time::Instant::now();
                abort.abort();
                at
            });

            let mut sink = BufferedResponse::new();
            sink.send_head(ResponseHead::new(http::StatusCode::OK)).await.unwrap();
            let outcome = result.forward(&mut sink).await.unwrap();
            let aborted_at = aborted_at.await.unwrap();

            assert_eq!(outcome, ForwardOutcome::Aborted);
            assert!(sink.chunks().iter().all(|c| c.at <= aborted_at));
            let body = sink.body_string();
            assert!(body.contains("early"));
            assert!(!body.contains("late-content"));
            assert!(!body.contains(r#"id="S:1""#));
            assert!(matches!(result.all_ready().await, Err(RenderError::Aborted)));
            assert_eq!(result.lifecycle().phase, LifecyclePhase::Aborted);
        }
    }

    #[tokio::test]
    async fn test_request_cancellation_aborts_render() {
        let token = CancellationToken::new();
        let tree = Node::suspense(Node::text("..."), [delayed("Slow", 500, "late")]);
        let result = ReadableRenderer.render(RenderJob::new(tree, scope()).with_cancellation(token.clone()));
        result.shell_ready().await.unwrap();

        token.cancel();

        assert!(matches!(result.all_ready().await, Err(RenderError::Aborted)));
        assert!(result.abort_handle().is_aborted());
    }

    #[tokio::test]
    async fn test_abort_before_shell() {
        let tree = delayed("Slow", 500, "late");
        let result = PipeRenderer.render(RenderJob::new(tree, scope()));

        result.abort();

        assert!(matches!(result.shell_ready().await, Err(RenderError::Aborted)));
    }

    #[test]
    fn test_renderer_for_kind() {
        assert_eq!(renderer_for(RendererKind::Pipe).kind(), RendererKind::Pipe);
        assert_eq!(renderer_for(RendererKind::Readable).kind(), RendererKind::Readable);
    }
}
