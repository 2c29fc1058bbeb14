//! Normalizing heterogeneous news payloads into a uniform article list

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Longest summary kept per article, in characters
pub const MAX_SUMMARY_CHARS: usize = 800;

const UNTITLED: &str = "Untitled";

/// An article reduced to what the prompt needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedArticle {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub summary: String,
}

/// Where the article list lives in an upstream payload
#[derive(Debug, PartialEq)]
pub enum UpstreamPayload<'a> {
    /// The payload itself is the list
    Bare(&'a [Value]),
    /// `{ "data": [...] }`
    Data(&'a [Value]),
    /// `{ "articles": [...] }`
    Articles(&'a [Value]),
    Other,
}

impl<'a> UpstreamPayload<'a> {
    /// Shapes are checked in declaration order; the first match wins
    pub fn classify(raw: &'a Value) -> Self {
        if let Some(items) = raw.as_array() {
            return UpstreamPayload::Bare(items);
        }
        if let Some(items) = raw.get("data").and_then(Value::as_array) {
            return UpstreamPayload::Data(items);
        }
        if let Some(items) = raw.get("articles").and_then(Value::as_array) {
            return UpstreamPayload::Articles(items);
        }
        UpstreamPayload::Other
    }

    pub fn items(&self) -> &'a [Value] {
        match self {
            UpstreamPayload::Bare(items) | UpstreamPayload::Data(items) | UpstreamPayload::Articles(items) => *items,
            UpstreamPayload::Other => &[],
        }
    }
}

/// Normalize any upstream payload. Never fails; unknown shapes yield nothing.
pub fn normalize(raw: &Value) -> Vec<NormalizedArticle> {
    let empty = Map::new();
    UpstreamPayload::classify(raw)
        .items()
        .iter()
        .map(|item| normalize_item(item.as_object().unwrap_or(&empty)))
        .filter(|article| !article.title.is_empty())
        .collect()
}

fn normalize_item(record: &Map<String, Value>) -> NormalizedArticle {
    let title = match record.get("title") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => UNTITLED.to_string(),
    };

    let url = first_text(record, &["url", "link"]).map(str::to_string);
    let summary = first_text(record, &["snippet", "description", "content"])
        .map(|s| truncate_chars(s, MAX_SUMMARY_CHARS).to_string())
        .unwrap_or_default();

    NormalizedArticle { title, url, summary }
}

/// First non-empty string among `keys`
fn first_text<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

/// Cut to at most `max_chars` characters, never inside a character
fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_shape_with_link_and_long_description() {
        let raw = json!({"data": [{"title": "A", "link": "http://x", "description": "d".repeat(1000)}]});
        assert_eq!(
            normalize(&raw),
            vec![NormalizedArticle {
                title: "A".to_string(),
                url: Some("http://x".to_string()),
                summary: "d".repeat(800),
            }]
        );
    }

    #[test]
    fn test_classification_order() {
        let bare = json!([{"title": "x"}]);
        assert!(matches!(UpstreamPayload::classify(&bare), UpstreamPayload::Bare(_)));

        // `data` wins over `articles`
        let both = json!({"data": [{"title": "d"}], "articles": [{"title": "a"}]});
        assert_eq!(normalize(&both)[0].title, "d");

        // A non-list `data` falls through to `articles`
        let fallthrough = json!({"data": {"nested": true}, "articles": [{"title": "a"}]});
        assert!(matches!(UpstreamPayload::classify(&fallthrough), UpstreamPayload::Articles(_)));
    }

    #[test]
    fn test_other_shapes_yield_nothing() {
        for raw in [json!({}), json!(null), json!("text"), json!(42), json!({"data": "x"}), json!({"items": []})] {
            assert!(normalize(&raw).is_empty(), "{raw}");
        }
    }

    #[test]
    fn test_title_rules() {
        let raw = json!([
            {"title": ""},
            {"summary": "no title"},
            "not a record",
            {"title": 2024},
            {"title": null},
            {"title": ["list"]}
        ]);
        let titles: Vec<_> = normalize(&raw).into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["Untitled", "Untitled", "2024", "Untitled", "Untitled"]);
    }

    #[test]
    fn test_field_preferences() {
        let raw = json!([{
            "title": "T",
            "url": "",
            "link": "http://link",
            "snippet": "",
            "description": "desc",
            "content": "body"
        }]);
        let article = &normalize(&raw)[0];
        assert_eq!(article.url.as_deref(), Some("http://link"));
        assert_eq!(article.summary, "desc");

        let bare = &normalize(&json!([{"title": "T", "url": 5}]))[0];
        assert_eq!(bare.url, None);
        assert_eq!(bare.summary, "");
    }

    #[test]
    fn test_summary_counts_characters() {
        let raw = json!([{"title": "T", "content": "é".repeat(900)}]);
        let summary = &normalize(&raw)[0].summary;
        assert_eq!(summary.chars().count(), MAX_SUMMARY_CHARS);
    }

    #[test]
    fn test_normalize_is_stable_on_its_output() {
        let raw = json!({"articles": [
            {"title": "One", "url": "http://1", "content": "c"},
            {"title": "Two"}
        ]});
        let first = normalize(&raw);
        let again = normalize(&serde_json::to_value(&first).unwrap());

        let key = |a: &NormalizedArticle| (a.title.clone(), a.url.clone());
        assert_eq!(first.iter().map(key).collect::<Vec<_>>(), again.iter().map(key).collect::<Vec<_>>());
    }

    #[test]
    fn test_serialized_form_omits_missing_url() {
        let article = NormalizedArticle {
            title: "T".to_string(),
            url: None,
            summary: String::new(),
        };
        assert_eq!(serde_json::to_value(&article).unwrap(), json!({"title": "T", "summary": ""}));
    }
}
