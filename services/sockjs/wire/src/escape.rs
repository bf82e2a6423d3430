//! Escaping of frame bodies for embedding in a double-quoted JavaScript
//! string literal (JSONP responses).
//!
//! The output only uses escapes that are valid in both JavaScript and JSON,
//! so a wrapped body can be recovered with any JSON string parser.

use std::fmt::Write;

/// Escape `input` so it can be placed between `"` quotes in a script
pub fn escape_for_javascript(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + input.len() / 8 + 2);

    for ch in input.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            // Keeps "</script>" from terminating an inline script block
            '/' => out.push_str("\\/"),
            c if (c as u32) < 0x20
                || ('\u{7f}'..='\u{9f}').contains(&c)
                || c == '\u{2028}'
                || c == '\u{2029}' =>
            {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }

    out
}

/// Wrap a frame body as a JSONP callback invocation
pub fn wrap_jsonp(callback: &str, body: &str) -> String {
    format!("{}(\"{}\");\r\n", callback, escape_for_javascript(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frame;

    #[test]
    fn test_escapes_string_breakers() {
        assert_eq!(escape_for_javascript(r#"a"b"#), r#"a\"b"#);
        assert_eq!(escape_for_javascript(r"a\b"), r"a\\b");
        assert_eq!(escape_for_javascript("a\nb\r"), r"a\nb\r");
        assert_eq!(escape_for_javascript("\u{2028}\u{2029}"), r"\u2028\u2029");
        assert_eq!(escape_for_javascript("\u{1}"), r"\u0001");
        assert_eq!(escape_for_javascript("</script>"), r"<\/script>");
    }

    #[test]
    fn test_leaves_plain_text_alone() {
        assert_eq!(escape_for_javascript("hello ünï ✓"), "hello ünï ✓");
    }

    #[test]
    fn test_wrapped_frame_is_single_statement() {
        let frame = Frame::Array(vec!["say \"hi\"\\\n".into(), "\u{2028}".into()]);
        let wrapped = wrap_jsonp("cb", &frame.encode());

        assert!(wrapped.starts_with("cb(\""));
        assert!(wrapped.ends_with("\");\r\n"));

        let literal = &wrapped["cb(".len()..wrapped.len() - ");\r\n".len()];
        assert!(!literal[1..literal.len() - 1].contains('\n'));

        // The literal must parse back to exactly the frame body
        let body: String = serde_json::from_str(literal).unwrap();
        assert_eq!(Frame::decode(&body).unwrap(), frame);
    }
}
