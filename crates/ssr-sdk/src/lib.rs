//! Public SDK for the streaming SSR engine.
//!
//! This crate re-exports the engine's crates:
//!
//! ```ignore
//! use ssr_sdk::prelude::*;
//!
//! let routes = RouteTable::from_routes([RouteDescriptor::new("/blog/:id", "blog/[id].tsx")]);
//! let components = ComponentRegistry::new().with_component("blog/[id].tsx", blog_post());
//! let dispatcher = RenderDispatcher::new(config, Arc::new(routes), Arc::new(components))
//!     .with_host_env(&HostEnv::capture());
//!
//! let mut ctx = dispatcher.context_for(&request);
//! let report = dispatcher.dispatch(&request, &mut ctx, &mut sink).await?;
//! ```

pub use ssr_cache;
pub use ssr_core;
pub use ssr_dispatch;
pub use ssr_security;
pub use ssr_streaming;

/// Prelude for convenient imports.
pub mod prelude {
    pub use ssr_cache::*;
    pub use ssr_core::*;
    pub use ssr_dispatch::*;
    pub use ssr_security::*;
    pub use ssr_streaming::*;
}
