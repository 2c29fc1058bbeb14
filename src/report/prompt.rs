//! The instruction prompt sent to the model

use super::{OpportunityReport, SourceRef, TamEstimate};
use crate::news::NormalizedArticle;

const INSTRUCTIONS: &str = "\
You are a venture analyst scouting for new companies. Read the business news \
articles below and identify the single most promising startup opportunity they \
point to. Use web search to check market size and recent competitors when it \
helps.

Ground the opportunity in one of the articles and cite it as the source. Size \
the total addressable market with a short, explicit methodology. Explain why \
the timing is right now, and list a few concrete first steps a founder could \
take this month.

Respond with a single JSON object and nothing else. Do not wrap it in prose. \
Use exactly this structure:";

/// The shape the model is asked to fill in
fn schema_example() -> OpportunityReport {
    OpportunityReport {
        opportunity: "One-paragraph description of the startup opportunity".to_string(),
        tam: TamEstimate {
            estimate: "Total addressable market, e.g. \"$2.5B\"".to_string(),
            methodology: "How the estimate was derived".to_string(),
        },
        why_now: "Why this opportunity exists now".to_string(),
        getting_started: vec![
            "First concrete step".to_string(),
            "Second concrete step".to_string(),
        ],
        source: SourceRef {
            title: "Title of the article the opportunity is based on".to_string(),
            url: "URL of that article".to_string(),
        },
    }
}

/// Build the prompt for `articles`. Pure: equal input gives equal output.
pub fn build_prompt(articles: &[NormalizedArticle]) -> String {
    let schema = serde_json::to_string_pretty(&schema_example()).unwrap_or_default();
    let articles = serde_json::to_string_pretty(articles).unwrap_or_default();
    format!("{INSTRUCTIONS}\n\n{schema}\n\nArticles:\n\n{articles}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, url: Option<&str>) -> NormalizedArticle {
        NormalizedArticle {
            title: title.to_string(),
            url: url.map(str::to_string),
            summary: format!("{title} summary"),
        }
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let articles = vec![article("A", Some("http://a")), article("B", None)];
        assert_eq!(build_prompt(&articles), build_prompt(&articles));
    }

    #[test]
    fn test_schema_keys_present_in_order() {
        let prompt = build_prompt(&[]);
        let positions: Vec<usize> = [
            "\"opportunity\"",
            "\"tam\"",
            "\"estimate\"",
            "\"methodology\"",
            "\"whyNow\"",
            "\"gettingStarted\"",
            "\"source\"",
        ]
        .iter()
        .map(|key| prompt.find(key).unwrap())
        .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_articles_follow_schema_in_input_order() {
        let prompt = build_prompt(&[article("Zeta", Some("http://z")), article("Alpha", None)]);
        let articles_at = prompt.find("Articles:").unwrap();
        let zeta = prompt.find("\"Zeta\"").unwrap();
        let alpha = prompt.find("\"Alpha\"").unwrap();
        assert!(articles_at < zeta && zeta < alpha);
        // Absent urls stay absent
        assert_eq!(prompt.matches("\"url\": \"http").count(), 1);
    }
}
