//! Content security policy scoped to a request nonce.

use crate::nonce::Nonce;

/// Header name for the content security policy.
pub const CONTENT_SECURITY_POLICY: &str = "content-security-policy";

/// A content security policy built from ordered directives.
#[derive(Debug, Clone, Default)]
pub struct ContentSecurityPolicy {
    directives: Vec<(String, Vec<String>)>,
}

impl ContentSecurityPolicy {
    /// Create an empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default policy for a server-rendered document.
    ///
    /// Scripts are restricted to same-origin sources and inline scripts
    /// carrying the request nonce.
    pub fn for_nonce(nonce: &Nonce) -> Self {
        Self::new()
            .directive("default-src", &["'self'"])
            .directive(
                "script-src",
                &["'self'", &format!("'nonce-{}'", nonce.as_str()), "'strict-dynamic'"],
            )
            .directive("style-src", &["'self'", "'unsafe-inline'"])
            .directive("object-src", &["'none'"])
            .directive("base-uri", &["'self'"])
    }

    /// Add or replace a directive.
    pub fn directive(mut self, name: &str, sources: &[&str]) -> Self {
        let sources: Vec<String> = sources.iter().map(|s| s.to_string()).collect();
        match self.directives.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = sources,
            None => self.directives.push((name.to_string(), sources)),
        }
        self
    }

    /// Append a source to an existing directive, creating it if absent.
    pub fn allow(mut self, name: &str, source: &str) -> Self {
        match self.directives.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => existing.push(source.to_string()),
            None => self
                .directives
                .push((name.to_string(), vec![source.to_string()])),
        }
        self
    }

    /// Render the header value.
    pub fn to_header_value(&self) -> String {
        self.directives
            .iter()
            .map(|(name, sources)| {
                if sources.is_empty() {
                    name.clone()
                } else {
                    format!("{} {}", name, sources.join(" "))
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_for_nonce_contains_nonce_source() {
        let nonce = Nonce::from_string("r4nd0m");
        let value = ContentSecurityPolicy::for_nonce(&nonce).to_header_value();

        assert!(value.contains("script-src 'self' 'nonce-r4nd0m' 'strict-dynamic'"));
        assert!(value.starts_with("default-src 'self'; "));
        assert!(value.contains("object-src 'none'"));
    }

    #[test]
    fn test_directive_replaces_existing() {
        let value = ContentSecurityPolicy::new()
            .directive("img-src", &["'self'"])
            .directive("img-src", &["https:"])
            .to_header_value();

        assert_eq!(value, "img-src https:");
    }

    #[test]
    fn test_allow_appends_source() {
        let value = ContentSecurityPolicy::new()
            .directive("connect-src", &["'self'"])
            .allow("connect-src", "https://api.example.com")
            .allow("frame-ancestors", "'none'")
            .to_header_value();

        assert_eq!(
            value,
            "connect-src 'self' https://api.example.com; frame-ancestors 'none'"
        );
    }
}
