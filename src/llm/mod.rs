//! Language model access through the OpenAI Responses API

mod client;
mod types;

pub use client::{OPENAI_API_URL, OpenAiClient};
pub use types::{OutputContent, OutputItem, ResponsesRequest, ResponsesResponse, ToolSpec};

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::pipeline::LanguageModel;

/// Model used for report synthesis
pub const MODEL_ID: &str = "gpt-4.1";

/// [`LanguageModel`] backed by OpenAI with web search enabled
pub struct OpenAiModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OpenAiModel {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        crate::install_crypto_provider();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: OPENAI_API_URL.to_string(),
            model: MODEL_ID.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn complete(&self, api_key: &str, prompt: &str) -> anyhow::Result<String> {
        let client = OpenAiClient::new(api_key, self.http.clone()).with_base_url(&self.base_url);
        let request = ResponsesRequest {
            model: self.model.clone(),
            input: prompt.to_string(),
            tools: vec![ToolSpec::web_search()],
        };

        let response = client.responses(&request).await?;
        let text = response.output_text();
        debug!(
            target: "pipeline",
            response_id = response.id.as_deref().unwrap_or("-"),
            chars = text.len(),
            "Model answered"
        );
        Ok(text)
    }
}
