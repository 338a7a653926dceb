use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Node};

static NON_LATIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\s\-,\.']").expect("static regex"));
static DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").expect("static regex"));

/// All descendant text of `node`, concatenated.
pub fn extract_text(node: ElementRef) -> String {
    node.text().collect::<String>()
}

/// Only the text nodes that are direct children of `node`.
pub fn own_text(node: ElementRef) -> String {
    node.children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(&**text),
            _ => None,
        })
        .collect::<String>()
}

/// Every ASCII digit in `text`, in order. "1,234 reviews" -> "1234".
pub fn digits_only(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// First decimal number in `text`, accepting a comma as decimal separator.
pub fn parse_score(text: &str) -> Option<f64> {
    let m = DECIMAL.find(text)?;
    m.as_str().replace(',', ".").parse().ok()
}

/// Drops anything outside basic Latin letters, digits, whitespace and `-,.'`.
pub fn strip_non_latin(text: &str) -> String {
    NON_LATIN.replace_all(text, "").trim().to_string()
}

/// A URL without its query string.
pub fn canonical_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
