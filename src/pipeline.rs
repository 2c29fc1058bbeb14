//! The startup-opportunity pipeline
//!
//! credentials -> paid news fetch -> normalize -> prompt -> model -> extract
//!
//! Missing credentials, an empty article list and unparseable model output
//! come back as a structured [`PipelineResult::Failure`]. Fetch and model
//! transport errors are returned as `Err` for the caller's transport layer to
//! report.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::news::{SigningKeys, normalize};
use crate::report::{build_prompt, extract};

/// Most articles handed to the model per run
pub const MAX_ARTICLES: usize = 6;

// ============================================================================
// Stage seams
// ============================================================================

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Name of a required setting that is not configured
    fn missing_setting(&self) -> Option<&'static str> {
        None
    }

    /// The raw upstream payload, in whatever shape the provider uses
    async fn fetch_news(&self, keys: &SigningKeys) -> anyhow::Result<Value>;
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// The model's full text answer to `prompt`
    async fn complete(&self, api_key: &str, prompt: &str) -> anyhow::Result<String>;
}

// ============================================================================
// Inputs and outputs
// ============================================================================

/// Secrets the pipeline needs; any may be absent
#[derive(Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub evm_private_key: Option<String>,
    pub solana_private_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &self.openai_api_key.is_some())
            .field("evm_private_key", &self.evm_private_key.is_some())
            .field("solana_private_key", &self.solana_private_key.is_some())
            .finish()
    }
}

/// Credentials that passed the presence check
struct CheckedCredentials<'a> {
    openai_api_key: &'a str,
    signing_keys: SigningKeys,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl Credentials {
    /// Checked in a fixed order; the first missing one is reported
    fn check(&self) -> Result<CheckedCredentials<'_>, &'static str> {
        let openai_api_key = present(&self.openai_api_key).ok_or("OPENAI_API_KEY")?;
        let evm_private_key = present(&self.evm_private_key).ok_or("EVM_PRIVATE_KEY")?;
        let solana_private_key = present(&self.solana_private_key).ok_or("SOLANA_PRIVATE_KEY")?;

        Ok(CheckedCredentials {
            openai_api_key,
            signing_keys: SigningKeys {
                evm_private_key: evm_private_key.to_string(),
                solana_private_key: solana_private_key.to_string(),
            },
        })
    }
}

/// What the tool returns: the model's report, or a structured failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineResult {
    Failure {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw: Option<String>,
    },
    Success(Value),
}

impl PipelineResult {
    pub fn failure(error: impl Into<String>) -> Self {
        PipelineResult::Failure {
            error: error.into(),
            raw: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            PipelineResult::Success(report) => report.clone(),
            PipelineResult::Failure { error, raw } => {
                let mut body = serde_json::json!({ "error": error });
                if let Some(raw) = raw {
                    body["raw"] = Value::String(raw.clone());
                }
                body
            }
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct OpportunityPipeline<N, M> {
    news: N,
    model: M,
}

impl<N: NewsSource, M: LanguageModel> OpportunityPipeline<N, M> {
    pub fn new(news: N, model: M) -> Self {
        Self { news, model }
    }

    pub async fn run(&self, credentials: &Credentials) -> anyhow::Result<PipelineResult> {
        let checked = match credentials.check() {
            Ok(checked) => checked,
            Err(missing) => {
                warn!(target: "pipeline", "Missing {}", missing);
                return Ok(PipelineResult::failure(format!("Missing {}", missing)));
            }
        };
        if let Some(missing) = self.news.missing_setting() {
            warn!(target: "pipeline", "Missing {}", missing);
            return Ok(PipelineResult::failure(format!("Missing {}", missing)));
        }

        // Fetch errors propagate unconverted; only the stages below map
        // their failures to structured results.
        let raw = self.news.fetch_news(&checked.signing_keys).await?;

        let mut articles = normalize(&raw);
        articles.truncate(MAX_ARTICLES);
        if articles.is_empty() {
            info!(target: "pipeline", "News source returned no usable articles");
            return Ok(PipelineResult::failure("No articles returned from news source"));
        }
        debug!(target: "pipeline", count = articles.len(), "Articles normalized");

        let prompt = build_prompt(&articles);
        let text = self.model.complete(checked.openai_api_key, &prompt).await?;

        match extract(&text) {
            Some(report) => {
                info!(target: "pipeline", "Opportunity report ready");
                Ok(PipelineResult::Success(report))
            }
            None => {
                warn!(target: "pipeline", chars = text.len(), "Model output is not JSON");
                Ok(PipelineResult::Failure {
                    error: "Model returned non-JSON output".to_string(),
                    raw: Some(text),
                })
            }
        }
    }
}
