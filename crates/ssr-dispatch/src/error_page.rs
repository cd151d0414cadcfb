//! Page-level error documents.

use http::StatusCode;
use ssr_core::{Environment, RenderError};
use ssr_security::escape_html;

const PAGE_STYLE: &str = "body{font-family:system-ui,sans-serif;margin:0;padding:4rem 2rem;color:#1f2328}\
main{max-width:40rem;margin:0 auto}\
h1{font-size:1.5rem}\
pre{background:#f6f8fa;padding:1rem;overflow:auto;font-size:.8rem}\
code{font-family:ui-monospace,monospace}";

/// A complete error response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDocument {
    /// Response status.
    pub status: StatusCode,
    /// Self-contained HTML.
    pub html: String,
    /// Id to quote when reporting the failure. Server errors only.
    pub tracking_id: Option<String>,
}

/// Renders 404 and 500 documents.
///
/// Production documents carry only a tracking id. Development documents
/// add the request path and the error's full cause chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorPageRenderer {
    environment: Environment,
}

impl ErrorPageRenderer {
    /// Create a renderer for `environment`.
    pub fn new(environment: Environment) -> Self {
        Self { environment }
    }

    /// The document for `error`: 404 for an unmatched route, 500 otherwise.
    pub fn render(&self, error: &RenderError, path: &str) -> ErrorDocument {
        match error {
            RenderError::RouteNotFound(_) => self.not_found(path),
            other => self.server_error(other, path),
        }
    }

    /// No route matched `path`.
    pub fn not_found(&self, path: &str) -> ErrorDocument {
        let mut body = String::from("<h1>Page not found</h1>\n<p>The page you requested does not exist.</p>\n");
        if self.environment.exposes_errors() {
            body.push_str(&format!("<p>Path: <code>{}</code></p>\n", escape_html(path)));
        }

        ErrorDocument {
            status: StatusCode::NOT_FOUND,
            html: page("404 Not Found", &body),
            tracking_id: None,
        }
    }

    /// Any other failure that reached the page level.
    pub fn server_error(&self, error: &RenderError, path: &str) -> ErrorDocument {
        let tracking_id = generate_tracking_id();
        let mut body = format!(
            "<h1>Something went wrong</h1>\n<p>Error ID: <code>{}</code></p>\n",
            tracking_id
        );
        if self.environment.exposes_errors() {
            body.push_str(&format!(
                "<p>Path: <code>{}</code></p>\n<pre>{}</pre>\n",
                escape_html(path),
                escape_html(&error.detail())
            ));
        }

        ErrorDocument {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            html: page("500 Internal Server Error", &body),
            tracking_id: Some(tracking_id),
        }
    }
}

/// A fresh error tracking id.
pub fn generate_tracking_id() -> String {
    uuid::Uuid::new_v4().hyphenated().to_string()
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n<main>\n{}</main>\n</body>\n</html>\n",
        title, PAGE_STYLE, body
    )
}
