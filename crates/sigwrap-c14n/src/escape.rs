#![forbid(unsafe_code)]

//! Character escaping for canonical output (Canonical XML 1.0 §2.3).
//!
//! Text escapes `& < >` and CR; attribute values escape `& < "` plus TAB,
//! LF and CR. Comments and PI data are written as they are. Input with
//! nothing to escape is returned borrowed.

use std::borrow::Cow;

fn text_entity(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '\r' => Some("&#xD;"),
        _ => None,
    }
}

fn attr_entity(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '"' => Some("&quot;"),
        '\t' => Some("&#x9;"),
        '\n' => Some("&#xA;"),
        '\r' => Some("&#xD;"),
        _ => None,
    }
}

fn escape_with(s: &str, entity: fn(char) -> Option<&'static str>) -> Cow<'_, str> {
    let Some(first) = s.find(|c| entity(c).is_some()) else {
        return Cow::Borrowed(s);
    };
    let mut out = String::with_capacity(s.len() + 8);
    out.push_str(&s[..first]);
    for c in s[first..].chars() {
        match entity(c) {
            Some(e) => out.push_str(e),
            None => out.push(c),
        }
    }
    Cow::Owned(out)
}

pub fn escape_text(s: &str) -> Cow<'_, str> {
    escape_with(s, text_entity)
}

pub fn escape_attr(s: &str) -> Cow<'_, str> {
    escape_with(s, attr_entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_input_is_borrowed() {
        assert!(matches!(escape_text("plain > text"), Cow::Owned(_)));
        assert!(matches!(escape_text("plain text"), Cow::Borrowed("plain text")));
        assert!(matches!(escape_attr("a>b"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_text_and_attribute_rules_differ() {
        assert_eq!(escape_text("a&b<c>d\"\t\r"), "a&amp;b&lt;c&gt;d\"\t&#xD;");
        assert_eq!(escape_attr("a&b<c>d\"\t\n\r"), "a&amp;b&lt;c>d&quot;&#x9;&#xA;&#xD;");
    }
}
