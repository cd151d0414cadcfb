//! The document shell around the app root.

use ssr_security::{escape_html, Nonce};

/// Head content for the document.
#[derive(Debug, Clone, Default)]
pub struct HeadContent {
    /// Page title.
    pub title: Option<String>,
    /// Meta tags.
    pub meta: Vec<(String, String)>,
    /// Stylesheet hrefs.
    pub stylesheets: Vec<String>,
    /// Inline scripts. Each gets the request nonce.
    pub scripts: Vec<String>,
}

impl HeadContent {
    /// Create new head content with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Add a meta tag.
    pub fn with_meta(mut self, name: &str, content: &str) -> Self {
        self.meta.push((name.to_string(), content.to_string()));
        self
    }

    /// Add a stylesheet link.
    pub fn with_stylesheet(mut self, href: impl Into<String>) -> Self {
        self.stylesheets.push(href.into());
        self
    }

    /// Add an inline script.
    pub fn with_script(mut self, source: impl Into<String>) -> Self {
        self.scripts.push(source.into());
        self
    }

    /// Render head content to HTML.
    pub fn render(&self, nonce: &Nonce) -> String {
        let mut html = String::from("<meta charset=\"utf-8\">\n");

        if let Some(title) = &self.title {
            html.push_str(&format!("<title>{}</title>\n", escape_html(title)));
        }

        for (name, content) in &self.meta {
            html.push_str(&format!(
                r#"<meta name="{}" content="{}">"#,
                escape_html(name),
                escape_html(content)
            ));
            html.push('\n');
        }

        for href in &self.stylesheets {
            html.push_str(&format!(r#"<link rel="stylesheet" href="{}">"#, escape_html(href)));
            html.push('\n');
        }

        for script in &self.scripts {
            html.push_str(&format!("<script {}>{}</script>\n", nonce.attribute(), script));
        }

        html
    }
}

/// Document template: everything around the rendered root.
#[derive(Debug, Clone)]
pub struct Document {
    /// Head content.
    pub head: HeadContent,
    /// Id of the element the app renders into.
    pub root_id: String,
    /// `lang` attribute on `<html>`.
    pub lang: Option<String>,
}

impl Document {
    /// Create a document with the given head.
    pub fn new(head: HeadContent) -> Self {
        Self {
            head,
            root_id: "root".to_string(),
            lang: None,
        }
    }

    /// Set the root element id.
    pub fn with_root_id(mut self, id: impl Into<String>) -> Self {
        self.root_id = id.into();
        self
    }

    /// Set the document language.
    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Everything up to and including the root's opening tag.
    pub fn render_opening(&self, nonce: &Nonce) -> String {
        let mut html = String::from("<!DOCTYPE html>\n");

        match &self.lang {
            Some(lang) => html.push_str(&format!("<html lang=\"{}\">\n", escape_html(lang))),
            None => html.push_str("<html>\n"),
        }
        html.push_str("<head>\n");
        html.push_str(&self.head.render(nonce));
        html.push_str("</head>\n<body>\n");
        html.push_str(&format!(r#"<div id="{}">"#, escape_html(&self.root_id)));

        html
    }

    /// Closes the root element.
    pub fn render_root_close(&self) -> &'static str {
        "</div>\n"
    }

    /// Closes body and html.
    pub fn render_closing(&self) -> &'static str {
        "</body>\n</html>\n"
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(HeadContent::default())
    }
}
