//! Pulling the JSON report out of free-form model output

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// A fenced block with an optional language tag; captures the interior
static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[\w+-]*[ \t]*\r?\n?(.*?)```").expect("valid regex"));

/// Parse the model's answer as JSON.
///
/// The fenced block is preferred over the surrounding text. When the candidate
/// does not parse as a whole, the span from its first `{` to its last `}` is
/// tried. Returns None rather than failing; a literal `null` counts as no
/// answer.
pub fn extract(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let candidate = FENCED_BLOCK
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    parse_non_null(candidate).or_else(|| brace_span(candidate).and_then(parse_non_null))
}

fn parse_non_null(candidate: &str) -> Option<Value> {
    serde_json::from_str(candidate).ok().filter(|v: &Value| !v.is_null())
}

fn brace_span(candidate: &str) -> Option<&str> {
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    (start < end).then(|| &candidate[start..=end])
}
