//! Core abstractions for the streaming SSR engine.
//!
//! This crate provides the fundamental types and traits:
//! - `RequestContext` - Per-request nonce, trace id, timing marks, cancellation
//! - `TimingMarks` - Append-only named timings and `Server-Timing` rendering
//! - `Clock` - Time source shared by caches and tests
//! - `RenderConfig` - Engine configuration and host environment overrides
//! - `RouteMatcher` - Route matching collaborator and a static route table
//! - `RenderError` - Error taxonomy shared across the render path

mod clock;
mod config;
mod context;
mod error;
mod lifecycle;
mod route;

pub use clock::*;
pub use config::*;
pub use context::*;
pub use error::*;
pub use lifecycle::*;
pub use route::*;
