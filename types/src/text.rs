//! Small pure text helpers.

/// Longest prefix of `s` holding at most `max_chars` characters.
#[must_use]
pub fn prefix_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Escape `&`, `<`, `>`, `"` and `'` for use in XML text or attribute values.
#[must_use]
pub fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Rough token estimate: one token per four characters, rounded up.
#[must_use]
pub fn estimate_tokens(s: &str) -> usize {
    s.chars().count().div_ceil(4)
}
