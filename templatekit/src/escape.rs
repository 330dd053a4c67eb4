//! HTML escaping for printed values.

use std::borrow::Cow;

/// Escape `& < > " '` for inclusion in HTML text or attribute values.
///
/// Returns the input unchanged (and unallocated) when nothing needs escaping.
pub fn html_escape(input: &str) -> Cow<'_, str> {
    let Some(first) = input.find(['&', '<', '>', '"', '\'']) else {
        return Cow::Borrowed(input);
    };
    let mut out = String::with_capacity(input.len() + 16);
    out.push_str(&input[..first]);
    for c in input[first..].chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}
