//! Markup for out-of-order reveal of suspended regions.
//!
//! A pending region is written into the shell as
//! `<!--$?--><template id="B:n"></template>fallback<!--/$-->`. When its
//! content settles, a hidden `<div id="S:n">` carrying the content is
//! streamed followed by `$RC("B:n","S:n")`, which moves the content into
//! place and drops the fallback.

use ssr_security::Nonce;

/// Client runtime that swaps a segment into its placeholder.
pub const REVEAL_RUNTIME: &str = concat!(
    "function $RC(b,s){var t=document.getElementById(b),n=document.getElementById(s);",
    "if(!t||!n)return;var p=t.parentNode,x=t.nextSibling,d=0;",
    "while(x){var y=x.nextSibling;if(x.nodeType===8){if(x.data===\"/$\"){if(d===0)break;d--}",
    "else if(x.data.charAt(0)===\"$\")d++}p.removeChild(x);x=y}",
    "while(n.firstChild)p.insertBefore(n.firstChild,x);",
    "var m=t.previousSibling;if(m&&m.nodeType===8)m.data=\"$\";",
    "p.removeChild(t);n.parentNode.removeChild(n)}"
);

/// Id of the placeholder template for region `id`.
pub fn placeholder_id(id: usize) -> String {
    format!("B:{}", id)
}

/// Id of the hidden segment for region `id`.
pub fn segment_id(id: usize) -> String {
    format!("S:{}", id)
}

/// Placeholder written into the shell for a pending region.
pub fn placeholder(id: usize, fallback_html: &str) -> String {
    format!(
        r#"<!--$?--><template id="{}"></template>{}<!--/$-->"#,
        placeholder_id(id),
        fallback_html
    )
}

/// Writes segments, sending the runtime before the first one.
#[derive(Debug)]
pub struct SegmentWriter {
    nonce: Nonce,
    runtime_sent: bool,
}

impl SegmentWriter {
    /// Create a writer whose scripts carry `nonce`.
    pub fn new(nonce: Nonce) -> Self {
        Self {
            nonce,
            runtime_sent: false,
        }
    }

    /// Markup for a settled region.
    pub fn segment(&mut self, id: usize, content_html: &str) -> String {
        let mut html = String::new();
        if !self.runtime_sent {
            html.push_str(&format!("<script {}>{}</script>", self.nonce.attribute(), REVEAL_RUNTIME));
            self.runtime_sent = true;
        }
        html.push_str(&format!(
            r#"<div hidden id="{}">{}</div><script {}>$RC("{}","{}")</script>"#,
            segment_id(id),
            content_html,
            self.nonce.attribute(),
            placeholder_id(id),
            segment_id(id)
        ));
        html
    }

    /// Whether the runtime has been written.
    pub fn runtime_sent(&self) -> bool {
        self.runtime_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_markup() {
        assert_eq!(
            placeholder(3, "<p>Loading</p>"),
            r#"<!--$?--><template id="B:3"></template><p>Loading</p><!--/$-->"#
        );
    }

    #[test]
    fn test_runtime_sent_once() {
        let mut writer = SegmentWriter::new(Nonce::from_string("abc"));

        let first = writer.segment(1, "<p>one</p>");
        let second = writer.segment(2, "<p>two</p>");

        assert!(first.contains("function $RC"));
        assert!(!second.contains("function $RC"));
        assert!(writer.runtime_sent());
        assert!(second.contains(r#"<div hidden id="S:2"><p>two</p></div>"#));
        assert!(second.contains(r#"<script nonce="abc">$RC("B:2","S:2")</script>"#));
    }
}
