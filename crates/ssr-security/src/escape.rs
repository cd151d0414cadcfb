//! Output escaping for HTML text and inline script payloads.

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape serialized JSON for embedding inside an inline `<script>`.
///
/// `<`, `>` and `&` become unicode escapes so the payload can never close
/// the script tag or open a comment. U+2028 and U+2029 are escaped because
/// they terminate string literals in older JavaScript engines. The result
/// is still valid JSON with identical meaning.
pub fn escape_json_for_script(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<script>"), "&lt;script&gt;");
        assert_eq!(escape_html("a&b"), "a&amp;b");
        assert_eq!(escape_html(r#""quoted" 'single'"#), "&quot;quoted&quot; &#x27;single&#x27;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_escape_json_for_script_closing_tag() {
        let escaped = escape_json_for_script(r#"{"html":"</script><script>alert(1)</script>"}"#);

        assert!(!escaped.contains("</script>"));
        assert!(escaped.contains("\\u003c/script\\u003e"));
    }

    #[test]
    fn test_escape_json_for_script_separators() {
        let escaped = escape_json_for_script("a\u{2028}b\u{2029}c & d");

        assert_eq!(escaped, "a\\u2028b\\u2029c \\u0026 d");
    }

    #[test]
    fn test_escaped_json_still_parses_to_same_value() {
        let original = "{\"k\":\"<b>&\u{2028}</b>\"}";
        let escaped = escape_json_for_script(original);

        // JSON unicode escapes decode back to the original characters
        assert_eq!(
            escaped,
            "{\"k\":\"\\u003cb\\u003e\\u0026\\u2028\\u003c/b\\u003e\"}"
        );
    }
}
