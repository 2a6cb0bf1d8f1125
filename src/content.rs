use crate::models::RawLink;
use once_cell::sync::Lazy;
use regex::Regex;

/// Single-level `[[...]]`: no `]` between the opening and closing pairs.
pub static LINK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[[^\]]+\]\]").unwrap());

/// Returns every `[[...]]` occurrence in `text`, in document order.
pub fn extract_links<'a>(source: &'a str, text: &'a str) -> Vec<RawLink<'a>> {
    LINK_REGEX
        .find_iter(text)
        .map(|m| RawLink {
            source,
            markup: m.as_str(),
        })
        .collect()
}
