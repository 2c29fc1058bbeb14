//! MCP (Model Context Protocol) JSON-RPC types
//!
//! Shared by the outbound client and the stdio server. x402 payment data
//! travels in `_meta` under the keys defined here.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol revision that introduced the streamable HTTP transport
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

// ============================================================================
// Error Codes (JSON-RPC standard + x402 extension)
// ============================================================================

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Payment Required - x402 extension for payment-gated methods
pub const PAYMENT_REQUIRED: i32 = 402;

// ============================================================================
// x402 `_meta` keys
// ============================================================================

/// Signed payment sent with a retried `tools/call`
pub const PAYMENT_META_KEY: &str = "x402/payment";

/// Settlement receipt returned with a paid result
pub const PAYMENT_RESPONSE_META_KEY: &str = "x402/payment-response";

/// Payment requirements carried by an `isError` tool result
pub const PAYMENT_ERROR_META_KEY: &str = "x402/error";

// ============================================================================
// JSON-RPC envelope
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
}

impl std::fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{}", n),
            JsonRpcId::String(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,

    /// None for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,

    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: JsonRpcId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,

    #[serde(default)]
    pub id: Option<JsonRpcId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// No id since we couldn't parse the request
    pub fn parse_error(message: &str) -> Self {
        Self::error(None, JsonRpcError::new(PARSE_ERROR, format!("Parse error: {}", message)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {}", method))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }

    /// x402 payment-required error; `data` holds `{x402Version, error, accepts}`
    pub fn payment_required(message: impl Into<String>, data: Value) -> Self {
        Self {
            code: PAYMENT_REQUIRED,
            message: message.into(),
            data: Some(data),
        }
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

// ============================================================================
// MCP Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    pub capabilities: Value,

    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    pub name: String,

    #[serde(default)]
    pub arguments: Option<Value>,

    #[serde(rename = "_meta", default)]
    pub meta: Option<Value>,
}

/// One block of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: Some(text.into()),
            data: None,
            mime_type: None,
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,

    #[serde(rename = "isError", default, skip_serializing_if = "is_false")]
    pub is_error: bool,

    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(text)],
            is_error: false,
            meta: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem::text(message)],
            is_error: true,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Text of the first `text` block
    pub fn first_text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|item| item.content_type == "text")
            .and_then(|item| item.text.as_deref())
    }

    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta.as_ref().and_then(|meta| meta.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_request() {
        let json = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.method, "tools/list");
        assert_eq!(req.id, Some(JsonRpcId::Number(1)));
        assert!(!req.is_notification());
    }

    #[test]
    fn test_notification_omits_id() {
        let json = serde_json::to_value(JsonRpcRequest::notification("notifications/initialized", None)).unwrap();
        assert_eq!(json, json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
    }

    #[test]
    fn test_serialize_error_response() {
        let resp = JsonRpcResponse::error(Some(JsonRpcId::Number(1)), JsonRpcError::method_not_found("unknown"));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["error"]["code"], METHOD_NOT_FOUND);
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_first_text_skips_other_blocks() {
        let result: ToolCallResult = serde_json::from_value(json!({
            "content": [
                {"type": "image", "data": "AAAA", "mimeType": "image/png"},
                {"type": "text", "text": "{\"articles\":[]}"},
                {"type": "text", "text": "second"}
            ]
        }))
        .unwrap();
        assert_eq!(result.first_text(), Some("{\"articles\":[]}"));
        assert!(!result.is_error);
    }

    #[test]
    fn test_tool_result_wire_form() {
        let result = ToolCallResult::text("ok").with_meta(json!({PAYMENT_RESPONSE_META_KEY: {"success": true}}));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["content"][0], json!({"type": "text", "text": "ok"}));
        assert!(json.get("isError").is_none());
        assert_eq!(json["_meta"]["x402/payment-response"]["success"], true);
    }
}
