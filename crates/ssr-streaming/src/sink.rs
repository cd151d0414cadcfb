//! Response sinks that enforce head-before-body ordering.

use std::fmt::Display;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Sink, SinkExt};
use http::{HeaderMap, StatusCode};

/// Errors from writing a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// Body bytes were written before the head.
    #[error("response head not sent")]
    HeadNotSent,

    /// The head was sent twice.
    #[error("response head already sent")]
    HeadAlreadySent,

    /// The response was already finished.
    #[error("response already finished")]
    Finished,

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Status and headers of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHead {
    /// Status code.
    pub status: StatusCode,
    /// Headers.
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// A head with `status` and no headers.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// Set headers.
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Where a response is written.
///
/// The head is sent exactly once, before any body bytes. Implementations
/// reject writes that break that order.
#[async_trait]
pub trait ResponseSink: Send {
    /// Commit status and headers.
    async fn send_head(&mut self, head: ResponseHead) -> Result<(), SinkError>;

    /// Write a body chunk.
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError>;

    /// End the body.
    async fn finish(&mut self) -> Result<(), SinkError>;

    /// Whether the head has been committed.
    fn head_sent(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Initial,
    HeadSent,
    Finished,
}

impl SinkState {
    fn check_head(self) -> Result<(), SinkError> {
        match self {
            Self::Initial => Ok(()),
            Self::HeadSent => Err(SinkError::HeadAlreadySent),
            Self::Finished => Err(SinkError::Finished),
        }
    }

    fn check_body(self) -> Result<(), SinkError> {
        match self {
            Self::Initial => Err(SinkError::HeadNotSent),
            Self::HeadSent => Ok(()),
            Self::Finished => Err(SinkError::Finished),
        }
    }
}

/// A body chunk and when it was written.
#[derive(Debug, Clone)]
pub struct WrittenChunk {
    /// The bytes.
    pub bytes: Bytes,
    /// Write time.
    pub at: Instant,
}

/// Collects a response in memory.
#[derive(Debug)]
pub struct BufferedResponse {
    state: SinkState,
    head: Option<ResponseHead>,
    chunks: Vec<WrittenChunk>,
}

impl BufferedResponse {
    /// Create an empty response.
    pub fn new() -> Self {
        Self {
            state: SinkState::Initial,
            head: None,
            chunks: Vec::new(),
        }
    }

    /// The committed head.
    pub fn head(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    /// Committed status.
    pub fn status(&self) -> Option<StatusCode> {
        self.head.as_ref().map(|h| h.status)
    }

    /// A committed header value.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head
            .as_ref()
            .and_then(|h| h.headers.get(name))
            .and_then(|v| v.to_str().ok())
    }

    /// Body chunks in write order.
    pub fn chunks(&self) -> &[WrittenChunk] {
        &self.chunks
    }

    /// The full body.
    pub fn body(&self) -> Bytes {
        let mut body = Vec::with_capacity(self.chunks.iter().map(|c| c.bytes.len()).sum());
        for chunk in &self.chunks {
            body.extend_from_slice(&chunk.bytes);
        }
        Bytes::from(body)
    }

    /// The full body as UTF-8, lossily.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body()).into_owned()
    }

    /// Whether the body was finished.
    pub fn is_finished(&self) -> bool {
        self.state == SinkState::Finished
    }

    /// Split into head and body.
    pub fn into_parts(self) -> (Option<ResponseHead>, Bytes) {
        let body = self.body();
        (self.head, body)
    }
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseSink for BufferedResponse {
    async fn send_head(&mut self, head: ResponseHead) -> Result<(), SinkError> {
        self.state.check_head()?;
        self.head = Some(head);
        self.state = SinkState::HeadSent;
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.state.check_body()?;
        self.chunks.push(WrittenChunk {
            bytes: chunk,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.state.check_body()?;
        self.state = SinkState::Finished;
        Ok(())
    }

    fn head_sent(&self) -> bool {
        self.state != SinkState::Initial
    }
}

/// One frame of a response on a frame-oriented transport.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFrame {
    /// Status and headers.
    Head(ResponseHead),
    /// Body bytes.
    Data(Bytes),
}

/// Adapts any `Sink<ResponseFrame>` into a [`ResponseSink`].
///
/// Works with channel senders feeding a host's body stream. Finishing
/// closes the inner sink.
pub struct SinkAdapter<S> {
    inner: S,
    state: SinkState,
}

impl<S, E> SinkAdapter<S>
where
    S: Sink<ResponseFrame, Error = E> + Unpin + Send,
    E: Display + Send,
{
    /// Wrap a sink.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: SinkState::Initial,
        }
    }

    /// Consume the adapter and return the inner sink.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S, E> ResponseSink for SinkAdapter<S>
where
    S: Sink<ResponseFrame, Error = E> + Unpin + Send,
    E: Display + Send,
{
    async fn send_head(&mut self, head: ResponseHead) -> Result<(), SinkError> {
        self.state.check_head()?;
        self.inner
            .send(ResponseFrame::Head(head))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;
        self.state = SinkState::HeadSent;
        Ok(())
    }

    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkError> {
        self.state.check_body()?;
        self.inner
            .send(ResponseFrame::Data(chunk))
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }

    async fn finish(&mut self) -> Result<(), SinkError> {
        self.state.check_body()?;
        self.state = SinkState::Finished;
        self.inner
            .close()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))
    }

    fn head_sent(&self) -> bool {
        self.state != SinkState::Initial
    }
}
