//! Turning articles into a prompt and the model's answer into a report

pub mod extract;
pub mod prompt;

pub use extract::extract;
pub use prompt::build_prompt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TamEstimate {
    pub estimate: String,
    pub methodology: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub title: String,
    pub url: String,
}

/// The report the model is asked to produce.
///
/// The pipeline passes the model's JSON through untouched; this type is for
/// callers that want it typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpportunityReport {
    pub opportunity: String,
    pub tam: TamEstimate,
    #[serde(rename = "whyNow")]
    pub why_now: String,
    #[serde(rename = "gettingStarted")]
    pub getting_started: Vec<String>,
    pub source: SourceRef,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_report_from_model_json() {
        let text = r#"```json
{"opportunity":"X","tam":{"estimate":"$1B","methodology":"m"},"whyNow":"w","gettingStarted":["a"],"source":{"title":"t","url":"u"}}
```"#;
        let report: OpportunityReport = serde_json::from_value(extract(text).unwrap()).unwrap();
        assert_eq!(report.opportunity, "X");
        assert_eq!(report.getting_started, vec!["a"]);
    }
}
