//! Route descriptors and the route matching collaborator.

use std::collections::HashMap;

use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Extracted route parameters (e.g., `:id` from `/blog/:id`).
pub type RouteParams = HashMap<String, String>;

/// A route the client needs to reconstruct navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDescriptor {
    /// Route pattern (e.g., "/blog/:id").
    pub path: String,
    /// Logical file identifier of the route component.
    pub file_path: String,
}

impl RouteDescriptor {
    /// Create a new route descriptor.
    pub fn new(path: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_path: file_path.into(),
        }
    }
}

/// A route matched for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRoute {
    /// The matched route.
    pub route: RouteDescriptor,
    /// Parameters extracted from the path.
    pub params: RouteParams,
}

/// Result of matching a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMatch {
    /// A route matched.
    Found(MatchedRoute),
    /// The path redirects elsewhere; nothing is rendered.
    Redirect {
        /// A 3xx status.
        status: StatusCode,
        /// Target location.
        location: String,
    },
    /// No route matched.
    NotFound,
}

/// Maps a request to a route, redirect or not-found signal.
pub trait RouteMatcher: Send + Sync {
    /// Match a request method and path.
    fn match_route(&self, method: &http::Method, path: &str) -> RouteMatch;

    /// Routes shipped to the client for navigation.
    fn routes(&self) -> Vec<RouteDescriptor>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    CatchAll(String),
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    descriptor: RouteDescriptor,
    segments: Vec<Segment>,
}

impl CompiledRoute {
    fn compile(descriptor: RouteDescriptor) -> Self {
        let segments = split_path(&descriptor.path)
            .map(|s| {
                if let Some(name) = s.strip_prefix(':') {
                    Segment::Param(name.to_string())
                } else if let Some(name) = s.strip_prefix('*') {
                    Segment::CatchAll(name.to_string())
                } else {
                    Segment::Static(s.to_string())
                }
            })
            .collect();
        Self {
            descriptor,
            segments,
        }
    }

    fn matches(&self, path: &str) -> Option<RouteParams> {
        let parts: Vec<&str> = split_path(path).collect();
        let mut params = RouteParams::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll(name) => {
                    params.insert(name.clone(), parts.get(i..).unwrap_or(&[]).join("/"));
                    return Some(params);
                }
                Segment::Static(expected) => {
                    if parts.get(i) != Some(&expected.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i)?;
                    params.insert(name.clone(), (*value).to_string());
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }

    /// Static segments outrank params, which outrank catch-alls.
    fn specificity(&self) -> Vec<u8> {
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Static(_) => 2,
                Segment::Param(_) => 1,
                Segment::CatchAll(_) => 0,
            })
            .collect()
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    let path = path.split(['?', '#']).next().unwrap_or("");
    path.split('/').filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
struct RedirectRule {
    from: String,
    to: String,
    status: StatusCode,
}

/// In-memory route table with `:param` and `*rest` patterns.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
    redirects: Vec<RedirectRule>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from descriptors.
    pub fn from_routes(routes: impl IntoIterator<Item = RouteDescriptor>) -> Self {
        routes.into_iter().fold(Self::new(), |table, r| table.with_route(r))
    }

    /// Add a route.
    pub fn with_route(mut self, route: RouteDescriptor) -> Self {
        self.routes.push(CompiledRoute::compile(route));
        self.routes
            .sort_by(|a, b| b.specificity().cmp(&a.specificity()));
        self
    }

    /// Add a redirect rule for an exact path.
    ///
    /// Statuses outside 300-399 are replaced with 307.
    pub fn with_redirect(mut self, from: impl Into<String>, to: impl Into<String>, status: StatusCode) -> Self {
        let status = if status.is_redirection() {
            status
        } else {
            StatusCode::TEMPORARY_REDIRECT
        };
        self.redirects.push(RedirectRule {
            from: from.into(),
            to: to.into(),
            status,
        });
        self
    }
}

impl RouteMatcher for RouteTable {
    fn match_route(&self, method: &http::Method, path: &str) -> RouteMatch {
        let normalized: Vec<&str> = split_path(path).collect();

        if let Some(rule) = self
            .redirects
            .iter()
            .find(|r| split_path(&r.from).eq(normalized.iter().copied()))
        {
            return RouteMatch::Redirect {
                status: rule.status,
                location: rule.to.clone(),
            };
        }

        if method != http::Method::GET && method != http::Method::HEAD {
            return RouteMatch::NotFound;
        }

        self.routes
            .iter()
            .find_map(|r| {
                r.matches(path).map(|params| {
                    RouteMatch::Found(MatchedRoute {
                        route: r.descriptor.clone(),
                        params,
                    })
                })
            })
            .unwrap_or(RouteMatch::NotFound)
    }

    fn routes(&self) -> Vec<RouteDescriptor> {
        self.routes.iter().map(|r| r.descriptor.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn blog_table() -> RouteTable {
        RouteTable::from_routes([
            RouteDescriptor::new("/", "index.tsx"),
            RouteDescriptor::new("/blog/:id", "blog/[id].tsx"),
            RouteDescriptor::new("/blog/new", "blog/new.tsx"),
            RouteDescriptor::new("/docs/*slug", "docs/[...slug].tsx"),
        ])
    }

    fn found(m: RouteMatch) -> MatchedRoute {
        match m {
            RouteMatch::Found(route) => route,
            other => panic!("expected a match, got {:?}", other),
        }
    }

    #[test]
    fn test_match_root() {
        let m = found(blog_table().match_route(&Method::GET, "/"));
        assert_eq!(m.route.file_path, "index.tsx");
        assert!(m.params.is_empty());
    }

    #[test]
    fn test_match_param() {
        let m = found(blog_table().match_route(&Method::GET, "/blog/1"));
        assert_eq!(m.route.file_path, "blog/[id].tsx");
        assert_eq!(m.params.get("id").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_static_segment_outranks_param() {
        let m = found(blog_table().match_route(&Method::GET, "/blog/new"));
        assert_eq!(m.route.file_path, "blog/new.tsx");
    }

    #[test]
    fn test_match_catch_all() {
        let m = found(blog_table().match_route(&Method::GET, "/docs/a/b/c?x=1"));
        assert_eq!(m.params.get("slug").map(String::as_str), Some("a/b/c"));
    }

    #[test]
    fn test_no_match() {
        assert_eq!(
            blog_table().match_route(&Method::GET, "/missing"),
            RouteMatch::NotFound
        );
        assert_eq!(
            blog_table().match_route(&Method::GET, "/blog/1/comments"),
            RouteMatch::NotFound
        );
        assert_eq!(
            blog_table().match_route(&Method::POST, "/blog/1"),
            RouteMatch::NotFound
        );
    }

    #[test]
    fn test_redirect_rule() {
        let table = blog_table().with_redirect("/old-blog/", "/blog/1", StatusCode::MOVED_PERMANENTLY);

        assert_eq!(
            table.match_route(&Method::GET, "/old-blog"),
            RouteMatch::Redirect {
                status: StatusCode::MOVED_PERMANENTLY,
                location: "/blog/1".to_string()
            }
        );
    }

    #[test]
    fn test_redirect_non_3xx_status_is_coerced() {
        let table = RouteTable::new().with_redirect("/a", "/b", StatusCode::OK);

        match table.match_route(&Method::GET, "/a") {
            RouteMatch::Redirect { status, .. } => assert_eq!(status, StatusCode::TEMPORARY_REDIRECT),
            other => panic!("expected redirect, got {:?}", other),
        }
    }

    #[test]
    fn test_route_descriptor_serializes_camel_case() {
        let json = serde_json::to_value(RouteDescriptor::new("/blog/:id", "blog/[id].tsx")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"path": "/blog/:id", "filePath": "blog/[id].tsx"})
        );
    }
}
