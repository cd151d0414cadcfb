//! Request dispatch for the streaming SSR engine.
//!
//! This crate turns a request into a response:
//! - `RenderDispatcher` - Routes, renders, enforces the shell timeout, writes the response
//! - `ComponentLoader` / `BuildManifest` - Collaborators resolving components and assets
//! - `ErrorPageRenderer` - Self-contained 404 and 500 documents
//! - `HeaderBatch` - CSP, Server-Timing, Cache-Control, ETag and request id in one batch
//! - `HydrationPayload` - Route table plus cache snapshot handed to the client
//! - `BootstrapScripts` - Runtime, vendor and app chunks in load order

mod bootstrap;
mod collaborators;
mod dispatcher;
mod error;
mod error_page;
mod headers;
mod hydration;

pub use bootstrap::*;
pub use collaborators::*;
pub use dispatcher::*;
pub use error::*;
pub use error_page::*;
pub use headers::*;
pub use hydration::*;
