//! Subcommand entry points
//!
//! Both commands build a fresh pipeline from the merged [`GlobalConfig`].
//! Missing settings never stop startup; they surface as structured results.

use anyhow::{Context, Result};

use crate::config::GlobalConfig;
use crate::llm::OpenAiModel;
use crate::mcp::{McpServer, tool_paywall};
use crate::news::McpNewsSource;
use crate::pipeline::OpportunityPipeline;
use crate::x402::FacilitatorClient;

fn build_pipeline(config: &GlobalConfig) -> Result<OpportunityPipeline<McpNewsSource, OpenAiModel>> {
    let news = McpNewsSource::new(config.news_mcp_url()).with_max_payment(config.max_payment()?);
    let model = OpenAiModel::new(config.request_timeout()).context("Failed to build model client")?;
    Ok(OpportunityPipeline::new(news, model))
}

/// Serve the paid tool over stdio until the client disconnects
pub async fn serve(config: &GlobalConfig) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let paywall = match tool_paywall(&config.recipients()) {
        Ok(paywall) => Some(paywall),
        Err(e) => {
            tracing::warn!("No paywall, tool calls will be refused: {}", e);
            None
        }
    };
    let facilitator = FacilitatorClient::try_from(config.facilitator_url())
        .context("Invalid facilitator URL")?
        .with_timeout(config.request_timeout());

    tracing::info!(facilitator = config.facilitator_url(), testnet = config.testnet, "Serving over stdio");

    McpServer::new(pipeline, config.credentials(), paywall, facilitator)
        .run()
        .await
}

/// Run the pipeline once and print the result JSON on stdout
pub async fn run_once(config: &GlobalConfig) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let result = pipeline.run(&config.credentials()).await?;
    println!("{}", serde_json::to_string_pretty(&result.to_json())?);
    Ok(())
}
