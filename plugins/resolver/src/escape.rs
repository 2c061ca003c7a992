//! Escaping for text embedded in a double-quoted attribute or an HTML comment

use std::borrow::Cow;

/// Escape a stored document for a `srcdoc="..."` attribute.
///
/// Only `&` and `"` are rewritten, in that order, so the entities produced for
/// quotes are never escaped a second time. Everything else, including script
/// and style bodies, passes through untouched.
pub fn escape_srcdoc(html: &str) -> String {
    html.replace('&', "&amp;").replace('"', "&quot;")
}

/// Escape untrusted text shown inside a diagnostic comment
pub fn escape_comment_text(text: &str) -> Cow<'_, str> {
    html_escape::encode_safe(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ampersand_is_escaped_before_quote() {
        assert_eq!(escape_srcdoc(r#"a & "b""#), "a &amp; &quot;b&quot;");
        assert_eq!(escape_srcdoc("&quot;"), "&amp;quot;");
    }

    #[test]
    fn test_no_bare_ampersand_or_quote_survives() {
        let input = r#"<script>if (a && b) { s = "x"; }</script>&amp;"#;
        let escaped = escape_srcdoc(input);

        assert!(!escaped.contains('"'));
        for (i, _) in escaped.match_indices('&') {
            let rest = &escaped[i..];
            assert!(rest.starts_with("&amp;") || rest.starts_with("&quot;"));
        }
    }

    #[test]
    fn test_other_characters_are_untouched() {
        let input = "<p class='x'>Grüße <b>日本</b> > < ' \n</p>";
        assert_eq!(escape_srcdoc(input), input);
    }

    #[test]
    fn test_comment_text_cannot_close_the_comment() {
        let escaped = escape_comment_text("x --> <script>");
        assert!(!escaped.contains("-->"));
        assert!(!escaped.contains('<'));
    }
}
