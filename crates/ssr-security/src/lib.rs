//! Security infrastructure for the streaming SSR engine.
//!
//! This crate provides:
//! - `Nonce` - Per-request token authorizing inline scripts
//! - `ContentSecurityPolicy` - Nonce-scoped CSP header builder
//! - `escape_html` / `escape_json_for_script` - Output escaping
//!
//! # Example
//!
//! ```ignore
//! use ssr_security::{ContentSecurityPolicy, Nonce};
//!
//! let nonce = Nonce::generate();
//! let header = ContentSecurityPolicy::for_nonce(&nonce).to_header_value();
//! ```

mod csp;
mod escape;
mod nonce;

pub use csp::*;
pub use escape::*;
pub use nonce::*;
