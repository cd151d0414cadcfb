//! Drives a render: shell first, then suspended regions as they settle.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::future::{self, BoxFuture};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use ssr_cache::panic_message;
use ssr_core::{RenderError, RevealStrategy};
use ssr_security::escape_html;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;

use crate::boundary::{BoundaryFrame, ErrorBoundary, ErrorReport, ErrorReporter, RenderPhase};
use crate::lifecycle::{AbortHandle, LifecycleWriter, RenderLifecycle};
use crate::node::{Node, Suspense};
use crate::renderer::RenderJob;
use crate::reveal::{self, SegmentWriter};
use crate::scope::Scope;

/// HTML for a subtree plus the regions it left pending.
#[derive(Default)]
struct Rendered {
    html: String,
    deferred: Vec<Deferred>,
}

impl Rendered {
    fn html(html: String) -> Self {
        Self {
            html,
            deferred: Vec::new(),
        }
    }

    fn append(&mut self, other: Rendered) {
        self.html.push_str(&other.html);
        self.deferred.extend(other.deferred);
    }
}

/// A suspense region whose content is still pending.
struct Deferred {
    id: usize,
    frame: Option<Arc<BoundaryFrame>>,
    content: BoxFuture<'static, anyhow::Result<Rendered>>,
}

type Settled = (usize, Option<Arc<BoundaryFrame>>, anyhow::Result<Rendered>);

impl Deferred {
    fn settle(self) -> BoxFuture<'static, Settled> {
        let Deferred { id, frame, content } = self;
        async move {
            let result = match AssertUnwindSafe(content).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(anyhow::anyhow!("render panicked: {}", panic_message(&*panic))),
            };
            (id, frame, result)
        }
        .boxed()
    }
}

/// State shared by every node of one render.
#[derive(Debug, Default)]
struct RenderState {
    suspense: AtomicUsize,
    boundary: AtomicUsize,
    flushed: AtomicBool,
}

#[derive(Clone)]
struct RenderCx {
    scope: Scope,
    state: Arc<RenderState>,
    frame: Option<Arc<BoundaryFrame>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl RenderCx {
    fn new(scope: Scope, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            scope,
            state: Arc::new(RenderState::default()),
            frame: None,
            reporter,
        }
    }

    fn within(&self, frame: Option<Arc<BoundaryFrame>>) -> Self {
        Self {
            frame,
            ..self.clone()
        }
    }

    fn next_suspense_id(&self) -> usize {
        self.state.suspense.fetch_add(1, Ordering::Relaxed)
    }

    fn next_boundary_id(&self) -> String {
        format!("eb:{}", self.state.boundary.fetch_add(1, Ordering::Relaxed))
    }

    /// Deferred content keeps running after the shell is sent, so the phase
    /// is read when an error is caught, not when the node was created.
    fn phase(&self) -> RenderPhase {
        if self.state.flushed.load(Ordering::Acquire) {
            RenderPhase::Stream
        } else {
            RenderPhase::Shell
        }
    }

    fn mark_flushed(&self) {
        self.state.flushed.store(true, Ordering::Release);
    }

    fn report(&self, phase: RenderPhase, error: &anyhow::Error, boundary: Option<&str>) {
        let mut report = ErrorReport::new(self.scope.request_id().as_str(), phase, error);
        if let Some(id) = boundary {
            report = report.with_boundary(id);
        }
        self.reporter.report(&report);
    }
}

fn render_node(node: Node, cx: RenderCx) -> BoxFuture<'static, anyhow::Result<Rendered>> {
    async move {
        match node {
            Node::Text(text) => Ok(Rendered::html(escape_html(&text))),
            Node::Raw(html) => Ok(Rendered::html(html)),
            Node::Element(mut element) => {
                let children = std::mem::take(&mut element.children);
                let mut out = Rendered::html(element.open_tag());
                if !element.is_void() {
                    out.append(render_children(children, cx).await?);
                }
                out.html.push_str(&element.close_tag());
                Ok(out)
            }
            Node::Fragment(children) => render_children(children, cx).await,
            Node::Component(component) => {
                let child = match AssertUnwindSafe(component.render(&cx.scope)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(anyhow::anyhow!("component panicked: {}", panic_message(&*panic))),
                };
                let child = child.inspect_err(|e| {
                    tracing::debug!(component = component.name(), error = %e, "component render failed");
                })?;
                render_node(child, cx).await
            }
            Node::Suspense(suspense) => render_suspense(suspense, cx).await,
            Node::Boundary(boundary) => render_boundary(boundary, cx).await,
        }
    }
    .boxed()
}

/// Siblings render concurrently; a suspended child does not hold up the others.
async fn render_children(children: Vec<Node>, cx: RenderCx) -> anyhow::Result<Rendered> {
    let results = future::join_all(children.into_iter().map(|child| render_node(child, cx.clone()))).await;

    let mut out = Rendered::default();
    for result in results {
        out.append(result?);
    }
    Ok(out)
}

async fn render_suspense(suspense: Suspense, cx: RenderCx) -> anyhow::Result<Rendered> {
    let id = cx.next_suspense_id();
    let mut content = render_children(suspense.children, cx.clone()).boxed();

    if let Some(ready) = (&mut content).now_or_never() {
        return ready;
    }

    let fallback = render_node(*suspense.fallback, cx.clone()).await?;
    let mut out = Rendered::html(reveal::placeholder(id, &fallback.html));
    out.deferred.extend(fallback.deferred);
    out.deferred.push(Deferred {
        id,
        frame: cx.frame.clone(),
        content,
    });
    Ok(out)
}

async fn render_boundary(boundary: ErrorBoundary, cx: RenderCx) -> anyhow::Result<Rendered> {
    let (id, children, fallback) = boundary.into_parts();
    let id = id.unwrap_or_else(|| cx.next_boundary_id());
    let frame = Arc::new(BoundaryFrame::new(id, fallback, cx.frame.clone()));

    match render_children(children, cx.within(Some(frame.clone()))).await {
        Ok(rendered) => Ok(rendered),
        Err(err) => {
            let phase = cx.phase();
            recover(Some(frame), err, cx, phase).await
        }
    }
}

/// Hand `err` to the nearest boundary, walking outwards while fallbacks fail.
async fn recover(
    mut frame: Option<Arc<BoundaryFrame>>,
    mut err: anyhow::Error,
    cx: RenderCx,
    phase: RenderPhase,
) -> anyhow::Result<Rendered> {
    while let Some(current) = frame {
        cx.report(phase, &err, Some(current.id.as_str()));
        let fallback = current.fallback_for(&err);
        match render_node(fallback, cx.within(current.parent.clone())).await {
            Ok(rendered) => return Ok(rendered),
            Err(next) => {
                err = next;
                frame = current.parent.clone();
            }
        }
    }
    Err(err)
}

/// A running render: its output, lifecycle and abort switch.
///
/// Dropping the task aborts the render.
pub(crate) struct RenderTask {
    pub(crate) chunks: mpsc::UnboundedReceiver<Bytes>,
    pub(crate) lifecycle: RenderLifecycle,
    pub(crate) abort: AbortHandle,
    _guard: DropGuard,
}

/// Start rendering `job` on its own task.
///
/// The render stops as soon as either the job's cancellation token or the
/// returned abort handle fires.
pub(crate) fn spawn_render(job: RenderJob) -> RenderTask {
    let token = job.cancellation.child_token();
    let (writer, lifecycle) = RenderLifecycle::channel();
    let (tx, rx) = mpsc::unbounded_channel();

    let task_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            biased;
            _ = task_token.cancelled() => {
                tracing::debug!("render aborted");
            }
            _ = run(job, &tx, &writer) => {}
        }
        if task_token.is_cancelled() {
            writer.aborted();
        }
    });

    RenderTask {
        chunks: rx,
        lifecycle,
        abort: AbortHandle::new(token.clone()),
        _guard: token.drop_guard(),
    }
}

async fn run(job: RenderJob, tx: &mpsc::UnboundedSender<Bytes>, lifecycle: &LifecycleWriter) {
    let RenderJob {
        tree,
        document,
        scope,
        nonce,
        reveal,
        reporter,
        tail,
        ..
    } = job;
    let request_id = scope.request_id().clone();
    let cx = RenderCx::new(scope, reporter);

    let root = match render_node(tree, cx.clone()).await {
        Ok(root) => root,
        Err(err) => {
            tracing::warn!(request_id = %request_id, error = %err, "shell render failed");
            lifecycle.shell_error(RenderError::shell(err));
            return;
        }
    };

    let mut shell = document.render_opening(&nonce);
    shell.push_str(&root.html);
    shell.push_str(document.render_root_close());
    cx.mark_flushed();
    if tx.send(Bytes::from(shell)).is_err() {
        return;
    }
    lifecycle.shell_ready();
    tracing::debug!(request_id = %request_id, pending = root.deferred.len(), "shell ready");

    let mut segments = SegmentWriter::new(nonce);
    let mut pending: FuturesUnordered<_> = root.deferred.into_iter().map(Deferred::settle).collect();
    let mut held: Vec<(usize, String)> = Vec::new();

    while let Some((id, frame, result)) = pending.next().await {
        let rendered = match result {
            Ok(rendered) => rendered,
            Err(err) => match recover(frame, err, cx.clone(), RenderPhase::Stream).await {
                Ok(rendered) => rendered,
                Err(err) => {
                    // Nothing caught it: the region keeps its suspense fallback.
                    tracing::warn!(request_id = %request_id, segment = id, error = %err, "stream render failed");
                    cx.report(RenderPhase::Stream, &err, None);
                    lifecycle.stream_error(RenderError::stream(err));
                    continue;
                }
            },
        };

        pending.extend(rendered.deferred.into_iter().map(Deferred::settle));
        match reveal {
            RevealStrategy::Progressive => {
                if tx.send(Bytes::from(segments.segment(id, &rendered.html))).is_err() {
                    return;
                }
            }
            RevealStrategy::Batched => held.push((id, rendered.html)),
        }
    }

    held.sort_by_key(|(id, _)| *id);
    for (id, html) in held {
        if tx.send(Bytes::from(segments.segment(id, &html))).is_err() {
            return;
        }
    }

    let mut closing = tail.map(|tail| tail()).unwrap_or_default();
    closing.push_str(document.render_closing());
    if tx.send(Bytes::from(closing)).is_err() {
        return;
    }
    lifecycle.all_ready();
    tracing::debug!(request_id = %request_id, "all ready");
}
