//! Paid MCP server over stdio
//!
//! Reads newline-delimited JSON-RPC from stdin and answers on stdout. The one
//! tool it exposes runs the opportunity pipeline, gated by an x402 paywall:
//!
//! 1. `tools/call` without `_meta["x402/payment"]` gets a 402 error listing
//!    the accepted payment options
//! 2. A presented payment is verified with the facilitator
//! 3. The pipeline runs; only a successful report is settled
//! 4. The reply carries the settlement receipt in `_meta`
//!
//! Without a payout address there is nothing to charge to, so the server
//! still starts but answers every call with a structured failure.

use anyhow::Result;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::pipeline::{Credentials, LanguageModel, NewsSource, OpportunityPipeline, PipelineResult};
use crate::x402::types::PaymentPayload;
use crate::x402::{Facilitator, Paywall, PaywallError, Recipients};

use super::protocol::*;

pub const TOOL_NAME: &str = "startup_opportunity";

pub const TOOL_DESCRIPTION: &str = "\
Scan today's business news and propose one startup opportunity with a \
TAM estimate, why-now reasoning and first steps. Paid per call in USDC.";

/// Price per call in USD
pub const TOOL_PRICE_USD: &str = "0.05";

const TOOL_RESOURCE: &str = "mcp://tool/startup_opportunity";

const MISSING_PAY_TO: &str = "Missing EVM_PAY_TO or SOLANA_PAY_TO";

/// The paywall for [`TOOL_NAME`] at [`TOOL_PRICE_USD`]
pub fn tool_paywall(recipients: &Recipients) -> Result<Paywall, PaywallError> {
    Paywall::new(TOOL_PRICE_USD.parse()?, recipients, TOOL_RESOURCE, TOOL_DESCRIPTION)
}

pub struct McpServer<N, M, F> {
    pipeline: OpportunityPipeline<N, M>,
    credentials: Credentials,
    paywall: Option<Paywall>,
    facilitator: F,
}

impl<N, M, F> McpServer<N, M, F>
where
    N: NewsSource,
    M: LanguageModel,
    F: Facilitator + Send + Sync,
{
    pub fn new(
        pipeline: OpportunityPipeline<N, M>,
        credentials: Credentials,
        paywall: Option<Paywall>,
        facilitator: F,
    ) -> Self {
        Self {
            pipeline,
            credentials,
            paywall,
            facilitator,
        }
    }

    fn log(&self, msg: &str) {
        tracing::debug!(target: "mcp", "{}", msg);
    }

    /// Serve on the process's stdin and stdout until EOF
    pub async fn run(&self) -> Result<()> {
        let reader = BufReader::new(tokio::io::stdin());
        let mut writer = tokio::io::stdout();
        self.serve(reader, &mut writer).await
    }

    /// Serve one line-delimited JSON-RPC stream until EOF
    pub async fn serve<R, W>(&self, mut reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();

        match &self.paywall {
            Some(paywall) => tracing::info!(
                target: "mcp",
                tool = TOOL_NAME,
                networks = ?paywall.requirements().iter().map(|r| r.network.to_string()).collect::<Vec<_>>(),
                "Server started"
            ),
            None => tracing::warn!(target: "mcp", tool = TOOL_NAME, "Server started without a paywall: {}", MISSING_PAY_TO),
        }

        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                self.log("EOF received, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(req) => req,
                Err(e) => {
                    write_response(writer, &JsonRpcResponse::parse_error(&e.to_string())).await?;
                    continue;
                }
            };

            self.log(&format!("<- {} (id={:?})", request.method, request.id));

            if request.is_notification() {
                self.handle_notification(&request);
                continue;
            }

            let response = self.handle_request(request).await;
            match &response.error {
                Some(error) => self.log(&format!("-> error: {}", error)),
                None => self.log("-> ok"),
            }
            write_response(writer, &response).await?;
        }

        Ok(())
    }

    fn handle_notification(&self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            "notifications/initialized" => self.log("Client initialized"),
            "notifications/cancelled" => self.log("Request cancelled"),
            other => self.log(&format!("Unknown notification: {}", other)),
        }
    }

    async fn handle_request(&self, req: JsonRpcRequest) -> JsonRpcResponse {
        let id = req.id.clone();

        let result = match req.method.as_str() {
            "initialize" => self.handle_initialize(),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(req.params).await,
            "ping" => Ok(json!({})),
            method => Err(JsonRpcError::method_not_found(method)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    fn handle_initialize(&self) -> Result<Value, JsonRpcError> {
        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: json!({ "tools": { "listChanged": false } }),
            server_info: ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        serde_json::to_value(result).map_err(|e| JsonRpcError::internal(e.to_string()))
    }

    fn handle_tools_list(&self) -> Value {
        json!({
            "tools": [ToolInfo {
                name: TOOL_NAME.to_string(),
                description: Some(TOOL_DESCRIPTION.to_string()),
                input_schema: json!({ "type": "object", "properties": {} }),
            }]
        })
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value, JsonRpcError> {
        let params = params.ok_or_else(|| JsonRpcError::invalid_params("Missing params"))?;
        let call: ToolCallParams = serde_json::from_value(params)
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))?;

        if call.name != TOOL_NAME {
            return Err(JsonRpcError::invalid_params(format!("Unknown tool: {}", call.name)));
        }

        let Some(paywall) = &self.paywall else {
            tracing::warn!(target: "mcp", "Refusing unpaid run: {}", MISSING_PAY_TO);
            let body = serde_json::to_string(&PipelineResult::failure(MISSING_PAY_TO).to_json())
                .map_err(|e| JsonRpcError::internal(e.to_string()))?;
            return serde_json::to_value(ToolCallResult::text(body)).map_err(|e| JsonRpcError::internal(e.to_string()));
        };

        let payment = call
            .meta
            .as_ref()
            .and_then(|meta| meta.get(PAYMENT_META_KEY))
            .ok_or_else(|| payment_required(paywall, "Payment required"))?;

        let payload = PaymentPayload::from_meta(payment)
            .map_err(|e| payment_required(paywall, format!("Invalid payment: {}", e)))?;

        let requirements = paywall
            .verify(&self.facilitator, &payload)
            .await
            .map_err(|e| payment_required(paywall, e.to_string()))?;

        let result = self.pipeline.run(&self.credentials).await.map_err(|e| {
            tracing::error!(target: "mcp", "Pipeline failed: {:#}", e);
            JsonRpcError::internal(format!("{:#}", e))
        })?;

        let body = serde_json::to_string(&result.to_json()).map_err(|e| JsonRpcError::internal(e.to_string()))?;

        let tool_result = match result {
            PipelineResult::Success(_) => {
                let settled = paywall
                    .settle(&self.facilitator, &payload, &requirements)
                    .await
                    .map_err(|e| payment_required(paywall, e.to_string()))?;
                let receipt = serde_json::to_value(&settled).map_err(|e| JsonRpcError::internal(e.to_string()))?;
                ToolCallResult::text(body).with_meta(json!({ PAYMENT_RESPONSE_META_KEY: receipt }))
            }
            // A failure is still a normal tool reply, just unsettled
            PipelineResult::Failure { .. } => {
                self.log("Pipeline returned a failure, payment not settled");
                ToolCallResult::text(body)
            }
        };

        serde_json::to_value(tool_result).map_err(|e| JsonRpcError::internal(e.to_string()))
    }
}

fn payment_required(paywall: &Paywall, error: impl Into<String>) -> JsonRpcError {
    let error = error.into();
    let data = serde_json::to_value(paywall.payment_required(error.clone())).unwrap_or(Value::Null);
    JsonRpcError::payment_required(error, data)
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &JsonRpcResponse) -> Result<()> {
    let output = serde_json::to_string(response)?;
    writer.write_all(output.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}
