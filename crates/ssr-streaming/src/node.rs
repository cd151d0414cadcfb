//! The renderable tree.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use ssr_security::escape_html;

use crate::boundary::ErrorBoundary;
use crate::scope::Scope;

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

/// A renderable unit of UI.
///
/// `render` may await: reading an unsettled resource suspends this
/// component only. Outside a [`Suspense`] region that delays the shell;
/// inside one, the region's fallback is streamed and the content follows.
#[async_trait]
pub trait Component: Send + Sync {
    /// Produce this component's subtree.
    async fn render(&self, scope: &Scope) -> anyhow::Result<Node>;

    /// Name used in logs and error reports.
    fn name(&self) -> &str {
        "component"
    }
}

/// A component built from an async closure.
pub struct FnComponent<F> {
    name: String,
    render: F,
}

impl<F, Fut> FnComponent<F>
where
    F: Fn(Scope) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Node>> + Send,
{
    /// Wrap `render` under `name`.
    pub fn new(name: impl Into<String>, render: F) -> Self {
        Self {
            name: name.into(),
            render,
        }
    }
}

#[async_trait]
impl<F, Fut> Component for FnComponent<F>
where
    F: Fn(Scope) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Node>> + Send,
{
    async fn render(&self, scope: &Scope) -> anyhow::Result<Node> {
        (self.render)(scope.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Shorthand for an `Arc`ed [`FnComponent`].
pub fn component_fn<F, Fut>(name: impl Into<String>, render: F) -> Arc<dyn Component>
where
    F: Fn(Scope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Node>> + Send + 'static,
{
    Arc::new(FnComponent::new(name, render))
}

/// An HTML element.
#[derive(Clone, Default)]
pub struct Element {
    /// Tag name.
    pub tag: String,
    /// Attributes in output order. Values are escaped on output.
    pub attrs: Vec<(String, String)>,
    /// Child nodes.
    pub children: Vec<Node>,
}

impl Element {
    /// Create an element with no attributes or children.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// Add an attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    /// Add a child.
    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    /// Add a text child.
    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Node::Text(text.into()))
    }

    /// Whether the element has no closing tag.
    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.tag.as_str())
    }

    pub(crate) fn open_tag(&self) -> String {
        let mut html = format!("<{}", self.tag);
        for (name, value) in &self.attrs {
            html.push_str(&format!(r#" {}="{}""#, name, escape_html(value)));
        }
        html.push('>');
        html
    }

    pub(crate) fn close_tag(&self) -> String {
        if self.is_void() {
            String::new()
        } else {
            format!("</{}>", self.tag)
        }
    }
}

/// A region whose content may stream after the shell.
///
/// If the content is ready on first poll it is inlined; otherwise the
/// fallback is placed in the shell and the content follows once settled.
#[derive(Clone)]
pub struct Suspense {
    /// Shown until the content is ready.
    pub fallback: Box<Node>,
    /// The suspended content.
    pub children: Vec<Node>,
}

/// A node in the render tree.
#[derive(Clone)]
pub enum Node {
    /// Text, escaped on output.
    Text(String),
    /// Trusted HTML, emitted as-is.
    Raw(String),
    /// An element.
    Element(Element),
    /// Siblings without a wrapper.
    Fragment(Vec<Node>),
    /// A component, rendered with the request scope.
    Component(Arc<dyn Component>),
    /// A suspense region.
    Suspense(Suspense),
    /// An error boundary.
    Boundary(ErrorBoundary),
}

impl Node {
    /// Escaped text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Trusted HTML.
    pub fn raw(html: impl Into<String>) -> Self {
        Self::Raw(html.into())
    }

    /// Nothing.
    pub fn empty() -> Self {
        Self::Fragment(Vec::new())
    }

    /// A fragment.
    pub fn fragment(children: impl IntoIterator<Item = Node>) -> Self {
        Self::Fragment(children.into_iter().collect())
    }

    /// A component node.
    pub fn component(component: Arc<dyn Component>) -> Self {
        Self::Component(component)
    }

    /// A suspense region with `fallback` around `children`.
    pub fn suspense(fallback: impl Into<Node>, children: impl IntoIterator<Item = Node>) -> Self {
        Self::Suspense(Suspense {
            fallback: Box::new(fallback.into()),
            children: children.into_iter().collect(),
        })
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Self::Element(element)
    }
}

impl From<ErrorBoundary> for Node {
    fn from(boundary: ErrorBoundary) -> Self {
        Self::Boundary(boundary)
    }
}

impl From<Arc<dyn Component>> for Node {
    fn from(component: Arc<dyn Component>) -> Self {
        Self::Component(component)
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Raw(html) => f.debug_tuple("Raw").field(html).finish(),
            Self::Element(el) => f
                .debug_struct("Element")
                .field("tag", &el.tag)
                .field("attrs", &el.attrs)
                .field("children", &el.children)
                .finish(),
            Self::Fragment(children) => f.debug_tuple("Fragment").field(children).finish(),
            Self::Component(c) => f.debug_tuple("Component").field(&c.name()).finish(),
            Self::Suspense(s) => f
                .debug_struct("Suspense")
                .field("fallback", &s.fallback)
                .field("children", &s.children)
                .finish(),
            Self::Boundary(b) => f.debug_tuple("Boundary").field(&b.id()).finish(),
        }
    }
}
