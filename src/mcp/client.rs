//! MCP client for the streamable HTTP transport
//!
//! Every JSON-RPC message is POSTed to a single endpoint. The server may answer
//! with a plain JSON body or with an SSE stream whose `data:` events carry the
//! response; both are handled. A session id handed out on `initialize` is
//! echoed back on every later request.

use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::{Value, json};
use tokio::sync::Mutex;
use url::Url;

use super::protocol::{
    JsonRpcError, JsonRpcId, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION, PAYMENT_REQUIRED,
    ToolCallResult,
};

const SESSION_HEADER: &str = "Mcp-Session-Id";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    /// Network, HTTP status or framing failure
    #[error("Transport error: {0}")]
    Transport(String),
    /// JSON-RPC error returned by the server
    #[error("RPC error ({}): {}", .0.code, .0.message)]
    Rpc(JsonRpcError),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    pub fn is_payment_required(&self) -> bool {
        matches!(self, McpError::Rpc(e) if e.code == PAYMENT_REQUIRED)
    }

    /// The `data` object of a 402 error
    pub fn payment_requirements(&self) -> Option<&Value> {
        match self {
            McpError::Rpc(e) if e.code == PAYMENT_REQUIRED => e.data.as_ref(),
            _ => None,
        }
    }
}

// ============================================================================
// MCP Client
// ============================================================================

pub struct McpClient {
    url: Url,
    request_id: AtomicI64,
    http_client: reqwest::Client,
    session_id: Mutex<Option<String>>,
}

impl McpClient {
    pub fn new(url: Url) -> Self {
        Self::with_http_client(url, crate::http_client())
    }

    pub fn with_http_client(url: Url, http_client: reqwest::Client) -> Self {
        Self {
            url,
            request_id: AtomicI64::new(1),
            http_client,
            session_id: Mutex::new(None),
        }
    }

    /// Connect to `url` and complete the initialize handshake
    pub async fn connect(url: Url) -> Result<Self, McpError> {
        let client = Self::new(url);
        client.initialize().await?;
        Ok(client)
    }

    fn log(&self, msg: &str) {
        tracing::debug!(target: "mcp-client", "{}", msg);
    }

    fn next_id(&self) -> i64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn initialize(&self) -> Result<Value, McpError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION")
            }
        });

        let result = self.call_method("initialize", Some(params)).await?;
        self.send_notification("notifications/initialized", None).await?;
        Ok(result)
    }

    /// Call a tool; `meta` is attached as `params._meta`
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<Value>,
        meta: Option<Value>,
    ) -> Result<ToolCallResult, McpError> {
        let mut params = json!({
            "name": name,
            "arguments": arguments.unwrap_or(json!({}))
        });
        if let Some(meta) = meta {
            params["_meta"] = meta;
        }

        let result = self.call_method("tools/call", Some(params)).await?;
        serde_json::from_value(result)
            .map_err(|e| McpError::Internal(format!("Failed to parse result: {}", e)))
    }

    // ========================================================================
    // HTTP Transport
    // ========================================================================

    async fn post(&self, message: &JsonRpcRequest) -> Result<reqwest::Response, McpError> {
        let mut request = self
            .http_client
            .post(self.url.clone())
            .header("Content-Type", "application/json")
            .header("Accept", "application/json, text/event-stream")
            .json(message);

        if let Some(session) = self.session_id.lock().await.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("HTTP request failed: {}", e)))?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(session.to_string());
        }

        Ok(response)
    }

    async fn call_method(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(JsonRpcId::Number(id), method, params);

        self.log(&format!("-> {} (id={})", method, id));

        let response = self.post(&request).await?;
        let status = response.status();
        let is_sse = response
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = response
            .text()
            .await
            .map_err(|e| McpError::Transport(format!("Failed to read response: {}", e)))?;

        self.log(&format!("<- {} ({} bytes{})", status, body.len(), if is_sse { ", sse" } else { "" }));

        let rpc_response = if is_sse {
            parse_sse_response(&body, &JsonRpcId::Number(id))?
        } else {
            serde_json::from_str::<JsonRpcResponse>(&body).map_err(|e| {
                if status.is_success() {
                    McpError::Transport(format!("Invalid JSON-RPC response: {}", e))
                } else {
                    McpError::Transport(format!("HTTP {}: {}", status, body))
                }
            })?
        };

        if let Some(error) = rpc_response.error {
            return Err(McpError::Rpc(error));
        }

        rpc_response
            .result
            .ok_or_else(|| McpError::Transport("Response has neither result nor error".to_string()))
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), McpError> {
        self.log(&format!("-> {} (notification)", method));

        let response = self.post(&JsonRpcRequest::notification(method, params)).await?;
        if !response.status().is_success() {
            return Err(McpError::Transport(format!(
                "Notification {} rejected: HTTP {}",
                method,
                response.status()
            )));
        }
        Ok(())
    }
}

/// Find the response for `id` among the events of an SSE body
///
/// Events may span several `data:` lines; they are joined with newlines.
/// Messages that are not the awaited response (server notifications,
/// progress) are skipped.
fn parse_sse_response(body: &str, id: &JsonRpcId) -> Result<JsonRpcResponse, McpError> {
    let mut data = String::new();
    let mut events = Vec::new();

    for line in body.lines().chain(std::iter::once("")) {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !data.is_empty() {
                events.push(std::mem::take(&mut data));
            }
        } else if let Some(payload) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(payload.strip_prefix(' ').unwrap_or(payload));
        }
    }

    events
        .iter()
        .filter_map(|event| serde_json::from_str::<JsonRpcResponse>(event).ok())
        .find(|response| response.id.as_ref() == Some(id))
        .ok_or_else(|| McpError::Transport("Event stream ended without a response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_single_event() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":3,\"result\":{\"ok\":true}}\n\n";
        let response = parse_sse_response(body, &JsonRpcId::Number(3)).unwrap();
        assert_eq!(response.result, Some(json!({"ok": true})));
    }

    #[test]
    fn test_sse_skips_notifications_and_joins_lines() {
        let body = concat!(
            "data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\r\n",
            "\r\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":7,\n",
            "data: \"error\":{\"code\":402,\"message\":\"pay\"}}\n"
        );
        let response = parse_sse_response(body, &JsonRpcId::Number(7)).unwrap();
        assert_eq!(response.error.unwrap().code, 402);
    }

    #[test]
    fn test_sse_without_matching_response() {
        let body = "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        assert!(matches!(
            parse_sse_response(body, &JsonRpcId::Number(2)),
            Err(McpError::Transport(_))
        ));
    }

    #[test]
    fn test_payment_required_detection() {
        let err = McpError::Rpc(JsonRpcError::payment_required("Payment required", json!({"accepts": []})));
        assert!(err.is_payment_required());
        assert_eq!(err.payment_requirements(), Some(&json!({"accepts": []})));

        let err = McpError::Rpc(JsonRpcError::internal("boom"));
        assert!(!err.is_payment_required());
        assert!(err.payment_requirements().is_none());
    }
}
