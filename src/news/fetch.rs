//! Fetching business news from a paid MCP data provider

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use crate::chain::PaymentSigners;
use crate::mcp::{McpClient, PaymentClient, ToolCallResult};
use crate::pipeline::NewsSource;
use crate::x402::{MoneyAmount, select_requirement};

/// Remote tool that returns the news payload
pub const NEWS_TOOL_NAME: &str = "get_business_news";

/// Ceiling on the paid news call, payment round-trip included
pub const NEWS_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Payer secrets, one per network family
#[derive(Clone)]
pub struct SigningKeys {
    pub evm_private_key: String,
    pub solana_private_key: String,
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKeys { .. }")
    }
}

/// News source backed by an x402-gated streamable-HTTP MCP server
#[derive(Debug, Clone)]
pub struct McpNewsSource {
    url: Option<Url>,
    max_payment: Option<MoneyAmount>,
    timeout: Duration,
}

impl McpNewsSource {
    /// `None` leaves the source unconfigured; the pipeline reports it
    pub fn new(url: Option<Url>) -> Self {
        Self {
            url,
            max_payment: None,
            timeout: NEWS_CALL_TIMEOUT,
        }
    }

    pub fn with_max_payment(mut self, max_payment: Option<MoneyAmount>) -> Self {
        self.max_payment = max_payment;
        self
    }

    /// Deadline covering the handshake, payment and retry
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connect_and_call(&self, url: &Url, keys: &SigningKeys) -> anyhow::Result<ToolCallResult> {
        let signers = PaymentSigners::from_secrets(&keys.evm_private_key, &keys.solana_private_key)
            .context("Failed to load payment signers")?;

        let client = McpClient::connect(url.clone())
            .await
            .with_context(|| format!("Failed to connect to news server at {}", url))?;

        let client = PaymentClient::new(client, signers, select_requirement).with_max_payment(self.max_payment);

        client
            .call_tool(NEWS_TOOL_NAME, Some(json!({})))
            .await
            .with_context(|| format!("Calling {} failed", NEWS_TOOL_NAME))
    }
}

#[async_trait]
impl NewsSource for McpNewsSource {
    fn missing_setting(&self) -> Option<&'static str> {
        self.url.is_none().then_some("NEWS_MCP_URL")
    }

    async fn fetch_news(&self, keys: &SigningKeys) -> anyhow::Result<Value> {
        let url = self.url.as_ref().context("NEWS_MCP_URL is not configured")?;

        let result = tokio::time::timeout(self.timeout, self.connect_and_call(url, keys))
            .await
            .map_err(|_| anyhow::anyhow!("News call to {} timed out after {:?}", url, self.timeout))??;

        Ok(payload_from_result(&result))
    }
}

/// The JSON in the first text block; `{}` when absent or unparseable
pub fn payload_from_result(result: &ToolCallResult) -> Value {
    if result.is_error {
        warn!(target: "pipeline", "News tool reported an error: {}", result.first_text().unwrap_or("-"));
    }

    let Some(text) = result.first_text() else {
        debug!(target: "pipeline", "News result has no text block");
        return json!({});
    };

    serde_json::from_str(text).unwrap_or_else(|e| {
        debug!(target: "pipeline", "News text is not JSON: {}", e);
        json!({})
    })
}
