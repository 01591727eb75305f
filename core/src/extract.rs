//! Tag extraction from the generator's raw output stream.
//! The generator is asked to echo input verbatim inside category tags, but
//! its output is unreliable; parsing is best-effort and malformed tags
//! simply match nothing.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{Category, TaggedSpan};

// The regex crate has no backreferences, so open/close name agreement is
// enforced with one compiled pattern per category; results are merged and
// sorted by start offset to restore document order.
static TAG_PATTERNS: Lazy<Vec<(Category, Regex)>> = Lazy::new(|| {
    Category::ALL
        .into_iter()
        .map(|category| {
            let tag = regex::escape(category.tag_name());
            let pattern = format!(r"(?is)<{tag}>\s*(.*?)\s*</{tag}>");
            let regex = Regex::new(&pattern).expect("static tag regex");
            (category, regex)
        })
        .collect()
});

/// Pulls every well-formed tagged span out of `raw`, in document order.
/// Inner text is trimmed but otherwise byte-exact; spans that trim to
/// nothing are dropped.
pub fn extract(raw: &str) -> Vec<TaggedSpan> {
    let mut found: Vec<(usize, TaggedSpan)> = Vec::new();
    for (category, regex) in TAG_PATTERNS.iter() {
        for caps in regex.captures_iter(raw) {
            let start = caps.get(0).map_or(0, |m| m.start());
            let Some(inner) = caps.get(1) else { continue };
            let text = inner.as_str().trim();
            if text.is_empty() {
                continue;
            }
            found.push((
                start,
                TaggedSpan {
                    category: *category,
                    text: text.to_string(),
                },
            ));
        }
    }
    found.sort_by_key(|(start, _)| *start);
    found.into_iter().map(|(_, span)| span).collect()
}

/// Re-emits every extracted span wrapped in its original tag, joined by
/// blank lines. This is the request body sent to the fixer.
pub fn rewrap(raw: &str) -> String {
    extract(raw)
        .iter()
        .map(|span| {
            let tag = span.category.tag_name();
            format!("<{tag}>{}</{tag}>", span.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
