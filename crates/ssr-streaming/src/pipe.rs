//! Push-style renderer: chunks go straight into a response sink.

use async_trait::async_trait;
use ssr_core::{LifecyclePhase, RenderError, RendererKind};

use crate::lifecycle::{AbortHandle, LifecycleSnapshot};
use crate::renderer::{ForwardOutcome, RenderJob, StreamResult};
use crate::scheduler::{spawn_render, RenderTask};
use crate::sink::{ResponseSink, SinkError};

/// A render piped into a [`ResponseSink`].
///
/// Shell-ready is the point where status and headers must be final:
/// the caller commits the head, then calls [`PipeableStream::pipe`].
pub struct PipeableStream {
    task: RenderTask,
}

impl PipeableStream {
    /// Start rendering `job`.
    pub fn new(job: RenderJob) -> Self {
        Self {
            task: spawn_render(job),
        }
    }

    /// Write chunks into `sink` as they are produced.
    ///
    /// Returns when the render completes or is aborted. After an abort
    /// nothing more is written and the sink is left unfinished for the
    /// caller to drop.
    pub async fn pipe(&mut self, sink: &mut dyn ResponseSink) -> Result<ForwardOutcome, SinkError> {
        if !sink.head_sent() {
            return Err(SinkError::HeadNotSent);
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = self.task.abort.aborted() => None,
                chunk = self.task.chunks.recv() => chunk,
            };
            match next {
                Some(chunk) => sink.write(chunk).await?,
                None => break,
            }
        }

        if self.task.abort.is_aborted() || self.task.lifecycle.snapshot().phase != LifecyclePhase::AllReady {
            tracing::debug!("pipe stopped before completion");
            return Ok(ForwardOutcome::Aborted);
        }

        sink.finish().await?;
        Ok(ForwardOutcome::Completed)
    }
}

#[async_trait]
impl StreamResult for PipeableStream {
    fn kind(&self) -> RendererKind {
        RendererKind::Pipe
    }

    async fn shell_ready(&self) -> Result<(), RenderError> {
        self.task.lifecycle.shell_ready().await
    }

    async fn all_ready(&self) -> Result<(), RenderError> {
        self.task.lifecycle.all_ready().await
    }

    async fn forward(&mut self, sink: &mut dyn ResponseSink) -> Result<ForwardOutcome, SinkError> {
        self.pipe(sink).await
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
    use crate::node::Node;
    use crate::scope::Scope;
    use crate::sink::BufferedResponse;
    use ssr_cache::ResourceCache;
    use ssr_core::RequestId;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pipe_requires_committed_head() {
        let scope = Scope::new(Arc::new(ResourceCache::new()), RequestId::generate());
        let mut stream = PipeableStream::new(RenderJob::new(Node::text("hi"), scope));
        stream.shell_ready().await.unwrap();

        let mut sink = BufferedResponse::new();
        assert_eq!(stream.pipe(&mut sink).await, Err(SinkError::HeadNotSent));
    }
}
