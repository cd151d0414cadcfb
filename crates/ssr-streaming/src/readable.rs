//! Pull-style renderer: a `futures::Stream` of body chunks.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use ssr_core::{LifecyclePhase, RenderError, RendererKind};

use crate::lifecycle::{AbortHandle, LifecycleSnapshot};
use crate::renderer::{ForwardOutcome, RenderJob, StreamResult};
use crate::scheduler::{spawn_render, RenderTask};
use crate::sink::{ResponseSink, SinkError};

/// A render exposed as a readable stream.
///
/// The caller pulls chunks with a reader loop and forwards them to its
/// transport. [`ReadableStream::open`] resolves once the stream is ready
/// to read, which is shell-ready; [`ReadableStream::all_ready`] resolves
/// once all content has been produced.
pub struct ReadableStream {
    task: RenderTask,
}

impl ReadableStream {
    /// Start rendering `job`.
    pub fn new(job: RenderJob) -> Self {
        Self {
            task: spawn_render(job),
        }
    }

    /// Start rendering `job` and wait until the stream is readable.
    pub async fn open(job: RenderJob) -> Result<Self, RenderError> {
        let stream = Self::new(job);
        stream.task.lifecycle.shell_ready().await?;
        Ok(stream)
    }

    /// Resolves once all content has been delivered to the stream.
    pub async fn all_ready(&self) -> Result<(), RenderError> {
        self.task.lifecycle.all_ready().await
    }

    /// Stop the render; the stream ends at the next read.
    pub fn cancel(&self) {
        self.task.abort.abort();
    }
}

impl Stream for ReadableStream {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        if self.task.abort.is_aborted() {
            return Poll::Ready(None);
        }
        self.task.chunks.poll_recv(cx)
    }
}

#[async_trait]
impl StreamResult for ReadableStream {
    fn kind(&self) -> RendererKind {
        RendererKind::Readable
    }

    async fn shell_ready(&self) -> Result<(), RenderError> {
        self.task.lifecycle.shell_ready().await
    }

    async fn all_ready(&self) -> Result<(), RenderError> {
        ReadableStream::all_ready(self).await
    }

    async fn forward(&mut self, sink: &mut dyn ResponseSink) -> Result<ForwardOutcome, SinkError> {
        if !sink.head_sent() {
            return Err(SinkError::HeadNotSent);
        }

        while let Some(chunk) = self.next().await {
            sink.write(chunk).await?;
        }

        if self.task.abort.is_aborted() || self.task.lifecycle.snapshot().phase != LifecyclePhase::AllReady {
            tracing::debug!("reader loop stopped before completion");
            return Ok(ForwardOutcome::Aborted);
        }

        sink.finish().await?;
        Ok(ForwardOutcome::Completed)
    }

    fn abort_handle(&self) -> AbortHandle {
        self.task.abort.clone()
    }

    fn lifecycle(&self) -> LifecycleSnapshot {
        self.task.lifecycle.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Element, Node};
    use crate::scope::Scope;
    use ssr_cache::ResourceCache;
    use ssr_core::RequestId;
    use std::sync::Arc;

    fn scope() -> Scope {
        Scope::new(Arc::new(ResourceCache::new()), RequestId::generate())
    }

    #[tokio::test]
    async fn test_reader_loop_collects_document() {
        let tree = Element::new("p").text("streamed").into();
        let mut stream = ReadableStream::open(RenderJob::new(tree, scope())).await.unwrap();

        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk);
        }
        stream.all_ready().await.unwrap();

        let body = String::from_utf8(body).unwrap();
        assert!(body.starts_with("<!DOCTYPE html>"));
        assert!(body.contains("<p>streamed</p>"));
        assert!(body.ends_with("</html>\n"));
    }

    #[tokio::test]
    async fn test_open_fails_on_shell_error() {
        let tree = Node::component(crate::node::component_fn("Broken", |_scope| async {
            Err(anyhow::anyhow!("no layout"))
        }));

        let result = ReadableStream::open(RenderJob::new(tree, scope())).await;
        assert!(matches!(result, Err(RenderError::ShellRender(_))));
    }

    #[tokio::test]
    async fn test_cancel_ends_stream() {
        let tree = Node::suspense(
            Node::text("..."),
            [Node::component(crate::node::component_fn("Slow", |_scope| async {
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok(Node::text("late"))
            }))],
        );
        let mut stream = ReadableStream::open(RenderJob::new(tree, scope())).await.unwrap();

        let shell = stream.next().await.unwrap();
        assert!(String::from_utf8_lossy(&shell).contains("<template id=\"B:0\">"));

        stream.cancel();
        assert!(stream.next().await.is_none());
        assert!(matches!(stream.all_ready().await, Err(RenderError::Aborted)));
    }
}
