//! Dispatch errors.

use ssr_streaming::SinkError;

/// Errors that stop a response from being written.
///
/// Render failures never show up here: they become error documents.
/// What remains are failures of the response path itself.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Writing to the response sink failed.
    #[error("response sink error: {0}")]
    Sink(#[from] SinkError),

    /// A header value could not be encoded.
    #[error("invalid value for header {name}: {value:?}")]
    InvalidHeader { name: String, value: String },

    /// A bootstrap chunk is missing from the build manifest.
    #[error("asset {0} not found in build manifest")]
    MissingAsset(String),
}
