//! Streaming renderers for shell-first SSR.
//!
//! This crate turns a component tree into HTML bytes:
//! - `Node` / `Component` - The renderable tree, with suspense and error boundaries
//! - `Scope` - What a component sees while rendering (params, resource cache)
//! - `StreamRenderer` / `StreamResult` - One lifecycle contract over two transports
//! - `PipeableStream` - Pushes chunks into a `ResponseSink` as they are produced
//! - `ReadableStream` - A pull-based `futures::Stream` of chunks with an all-ready signal
//! - `ResponseSink` - Head-then-body response writer with enforced ordering
//! - `Document` / `HeadContent` - The document shell around the app root
//!
//! Content outside any pending suspense boundary forms the shell. Once the
//! shell is out, each suspended subtree is streamed as a hidden segment and
//! swapped into place by a small inline script.

mod boundary;
mod lifecycle;
mod node;
mod pipe;
mod readable;
mod renderer;
mod reveal;
mod scheduler;
mod scope;
mod shell;
mod sink;

pub use boundary::*;
pub use lifecycle::*;
pub use node::*;
pub use pipe::*;
pub use readable::*;
pub use renderer::*;
pub use reveal::*;
pub use scope::*;
pub use shell::*;
pub use sink::*;
