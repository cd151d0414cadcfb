//! Resource cache for suspending renders.
//!
//! This crate provides:
//! - `Resource` - A settled-once handle over a running fetch
//! - `ResourceCache` - Keyed, TTL-checked, deduplicating resource store
//!   with serialize/hydrate for client handoff
//! - `InflightFetches` - Dedup of identical concurrent outbound fetches
//! - `CacheControl` / `generate_etag` - Response cache headers
//!
//! # Example
//!
//! ```ignore
//! use ssr_cache::{CacheOptions, ResourceCache};
//!
//! let cache = ResourceCache::new();
//! let post = cache.create_cached("post:1", || fetch_post(1), CacheOptions::default());
//! let value: Post = post.read_as().await?;
//! ```

mod headers;
mod inflight;
mod resource;
mod store;

pub use headers::*;
pub use inflight::*;
pub use resource::*;
pub use store::*;
