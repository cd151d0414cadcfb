//! Per-request nonce for inline script authorization.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of random bytes in a generated nonce.
const NONCE_BYTES: usize = 16;

/// A cryptographically random token that authorizes inline scripts.
///
/// Every inline `<script>` emitted for a request carries the same nonce,
/// and the response's content security policy allows only that nonce.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nonce(String);

impl Nonce {
    /// Generate a fresh nonce from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let bytes: [u8; NONCE_BYTES] = rand::thread_rng().gen();
        Self(STANDARD.encode(bytes))
    }

    /// Wrap an existing nonce value.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the nonce as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the `nonce="..."` attribute for a script tag.
    pub fn attribute(&self) -> String {
        format!(r#"nonce="{}""#, self.0)
    }
}

impl std::fmt::Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
