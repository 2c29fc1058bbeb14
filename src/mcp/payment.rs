//! Paying for tool calls on x402-gated MCP servers
//!
//! A gated server signals payment in one of two ways: a JSON-RPC error with
//! code 402 whose `data` carries `accepts`, or a tool result flagged `isError`
//! whose `_meta["x402/error"]` carries `accepts`. Either way the client picks
//! an option, signs it, and retries once with `_meta["x402/payment"]`.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::chain::PaymentSigners;
use crate::x402::types::{MoneyAmount, PaymentRequirements, parse_accepts};
use crate::x402::{PaymentSignError, SelectRequirement};

use super::client::{McpClient, McpError};
use super::protocol::{PAYMENT_ERROR_META_KEY, PAYMENT_META_KEY, PAYMENT_RESPONSE_META_KEY, ToolCallResult};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error(transparent)]
    Mcp(#[from] McpError),
    #[error("Payment required but no payment options were offered")]
    NoPaymentOptions,
    #[error("No offered network is supported: {0}")]
    NoSupportedNetwork(String),
    #[error("Payment of {amount} exceeds the per-call maximum of {max}")]
    ExceedsMaximum { amount: MoneyAmount, max: MoneyAmount },
    #[error("Failed to sign payment: {0}")]
    Signing(#[from] PaymentSignError),
    #[error("Failed to encode payment: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Payment rejected by server: {0}")]
    Rejected(String),
    #[error("Tool call timed out after {0:?}")]
    Timeout(Duration),
}

/// Settlement receipt from `_meta["x402/payment-response"]`
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentReceipt {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "transactionHash")]
    pub transaction: Option<String>,
    #[serde(default)]
    pub network: Option<String>,
}

/// An [`McpClient`] that settles x402 payment requests on its own
pub struct PaymentClient {
    client: McpClient,
    signers: PaymentSigners,
    select: SelectRequirement,
    max_payment: Option<MoneyAmount>,
}

impl PaymentClient {
    pub fn new(client: McpClient, signers: PaymentSigners, select: SelectRequirement) -> Self {
        Self {
            client,
            signers,
            select,
            max_payment: None,
        }
    }

    /// Refuse single payments above `max`
    pub fn with_max_payment(mut self, max: Option<MoneyAmount>) -> Self {
        self.max_payment = max;
        self
    }

    fn log(&self, msg: &str) {
        tracing::debug!(target: "x402-pay", "{}", msg);
    }

    /// Call a tool under a hard deadline covering payment and retry
    pub async fn call_tool_with_timeout(
        &self,
        name: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> Result<ToolCallResult, PaymentError> {
        tokio::time::timeout(timeout, self.call_tool(name, arguments))
            .await
            .map_err(|_| PaymentError::Timeout(timeout))?
    }

    pub async fn call_tool(&self, name: &str, arguments: Option<Value>) -> Result<ToolCallResult, PaymentError> {
        let accepts = match self.client.call_tool(name, arguments.clone(), None).await {
            Ok(result) => match payment_requested_by_result(&result) {
                Some(data) => data,
                None => return Ok(result),
            },
            Err(e) if e.is_payment_required() => e.payment_requirements().cloned().unwrap_or(Value::Null),
            Err(e) => return Err(e.into()),
        };

        let requirements = self.choose(&accepts)?;
        let payload = requirements.sign(&self.signers)?;
        let meta = json!({ PAYMENT_META_KEY: payload.to_base64()? });

        self.log(&format!(
            "Paying {} on {} to {}, retrying {}",
            requirements.max_amount_required, requirements.network, requirements.pay_to, name
        ));

        let result = match self.client.call_tool(name, arguments, Some(meta)).await {
            Ok(result) => result,
            Err(e) if e.is_payment_required() => return Err(PaymentError::Rejected(e.to_string())),
            Err(e) => return Err(e.into()),
        };

        if payment_requested_by_result(&result).is_some() {
            let reason = result.first_text().unwrap_or("payment not accepted").to_string();
            return Err(PaymentError::Rejected(reason));
        }

        match payment_receipt(&result) {
            Some(receipt) if receipt.success => tracing::info!(
                target: "x402-pay",
                tool = name,
                network = %requirements.network,
                transaction = receipt.transaction.as_deref().unwrap_or("-"),
                "Payment settled"
            ),
            Some(_) => tracing::warn!(target: "x402-pay", tool = name, "Server reported unsuccessful settlement"),
            None => self.log("No payment receipt in result"),
        }

        Ok(result)
    }

    fn choose(&self, data: &Value) -> Result<PaymentRequirements, PaymentError> {
        let accepts = parse_accepts(data);
        if accepts.is_empty() {
            return Err(PaymentError::NoPaymentOptions);
        }
        self.log(&format!("Payment required: {} option(s)", accepts.len()));

        let selected = (self.select)(&accepts, &self.signers).ok_or_else(|| {
            let offered: Vec<String> = accepts.iter().map(|r| r.network.to_string()).collect();
            PaymentError::NoSupportedNetwork(offered.join(", "))
        })?;

        if let (Some(max), Some(amount)) = (self.max_payment, selected.amount_usd()) {
            if amount > max {
                return Err(PaymentError::ExceedsMaximum { amount, max });
            }
        }

        Ok(selected)
    }
}

/// `accepts` data from an `isError` result carrying `_meta["x402/error"]`
fn payment_requested_by_result(result: &ToolCallResult) -> Option<Value> {
    if !result.is_error {
        return None;
    }
    result
        .meta_value(PAYMENT_ERROR_META_KEY)
        .filter(|data| data.get("accepts").is_some())
        .cloned()
}

pub fn payment_receipt(result: &ToolCallResult) -> Option<PaymentReceipt> {
    result
        .meta_value(PAYMENT_RESPONSE_META_KEY)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{EvmSigner, SvmSigner};
    use crate::x402::select_requirement;
    use crate::x402::types::PaymentPayload;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};
    use url::Url;

    type Respond = Arc<dyn Fn(usize, &Value) -> Value + Send + Sync>;

    /// Minimal streamable-HTTP MCP endpoint. `respond` gets the 1-based
    /// `tools/call` attempt and the request, and returns the `result` or
    /// `error` half of the JSON-RPC reply.
    async fn mcp_endpoint(respond: impl Fn(usize, &Value) -> Value + Send + Sync + 'static) -> (Url, Arc<Mutex<Vec<Value>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/mcp", listener.local_addr().unwrap())).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let respond: Respond = Arc::new(respond);

        let requests = seen.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, respond.clone(), requests.clone()));
            }
        });

        (url, seen)
    }

    async fn serve_connection(stream: TcpStream, respond: Respond, seen: Arc<Mutex<Vec<Value>>>) -> std::io::Result<()> {
        let (read, mut write) = stream.into_split();
        let mut reader = BufReader::new(read);
        let mut line = String::new();

        // One JSON-RPC message per request, keep-alive between them
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }

            let mut content_length = 0;
            loop {
                line.clear();
                if reader.read_line(&mut line).await? == 0 {
                    return Ok(());
                }
                let header = line.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap_or(0);
                    }
                }
            }

            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await?;
            let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

            let Some(id) = request.get("id").cloned() else {
                write.write_all(b"HTTP/1.1 202 Accepted\r\nContent-Length: 0\r\n\r\n").await?;
                continue;
            };

            let attempt = {
                let mut seen = seen.lock().unwrap();
                seen.push(request.clone());
                seen.iter().filter(|r| r["method"] == "tools/call").count()
            };

            let mut reply = respond(attempt, &request);
            reply["jsonrpc"] = json!("2.0");
            reply["id"] = id;
            let reply = serde_json::to_vec(&reply).unwrap();

            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
                reply.len()
            );
            write.write_all(head.as_bytes()).await?;
            write.write_all(&reply).await?;
        }
    }

    fn payment_required_error() -> Value {
        json!({ "error": { "code": 402, "message": "Payment required", "data": accepts_body() } })
    }

    fn paid_result() -> Value {
        json!({
            "result": {
                "content": [{ "type": "text", "text": "{\"articles\":[]}" }],
                "_meta": { PAYMENT_RESPONSE_META_KEY: { "success": true, "transaction": "0xbeef", "network": "base-sepolia" } }
            }
        })
    }

    fn sent_payment(request: &Value) -> Option<PaymentPayload> {
        let meta = request["params"]["_meta"].get(PAYMENT_META_KEY)?;
        PaymentPayload::from_meta(meta).ok()
    }

    fn accepts_body() -> Value {
        json!({
            "x402Version": 1,
            "error": "Payment required",
            "accepts": [{
                "scheme": "exact",
                "network": "base-sepolia",
                "maxAmountRequired": "10000",
                "resource": "mcp://tool/get_business_news",
                "description": "Business news",
                "mimeType": "application/json",
                "payTo": "0x1234567890123456789012345678901234567890",
                "maxTimeoutSeconds": 60,
                "asset": "0x036CbD53842c5426634e7929541eC2318f3dCF7e"
            }]
        })
    }

    fn payment_client(max: Option<&str>) -> PaymentClient {
        paying_client(Url::parse("http://127.0.0.1:9/mcp").unwrap(), max)
    }

    fn paying_client(url: Url, max: Option<&str>) -> PaymentClient {
        PaymentClient::new(
            McpClient::new(url),
            PaymentSigners::new(EvmSigner::random(), SvmSigner::random()),
            select_requirement,
        )
        .with_max_payment(max.map(|m| m.parse().unwrap()))
    }

    #[test]
    fn test_payment_requested_by_error_result() {
        let result = ToolCallResult::error("Payment required").with_meta(json!({ PAYMENT_ERROR_META_KEY: accepts_body() }));
        assert!(payment_requested_by_result(&result).is_some());

        // An ordinary tool error is returned as-is
        assert!(payment_requested_by_result(&ToolCallResult::error("upstream down")).is_none());

        // Meta without accepts is not a payment request
        let result = ToolCallResult::error("x").with_meta(json!({ PAYMENT_ERROR_META_KEY: {"reason": "?"} }));
        assert!(payment_requested_by_result(&result).is_none());
    }

    #[test]
    fn test_choose_respects_maximum() {
        // 10000 units of 6-decimal USDC is $0.01
        assert!(payment_client(Some("0.05")).choose(&accepts_body()).is_ok());
        assert!(matches!(
            payment_client(Some("0.005")).choose(&accepts_body()),
            Err(PaymentError::ExceedsMaximum { .. })
        ));
    }

    #[test]
    fn test_choose_without_options() {
        assert!(matches!(
            payment_client(None).choose(&json!({"accepts": []})),
            Err(PaymentError::NoPaymentOptions)
        ));
        assert!(matches!(
            payment_client(None).choose(&Value::Null),
            Err(PaymentError::NoPaymentOptions)
        ));
    }

    #[test]
    fn test_choose_without_supported_network() {
        let client = PaymentClient {
            signers: PaymentSigners {
                evm: None,
                svm: Some(SvmSigner::random()),
            },
            ..payment_client(None)
        };
        assert!(matches!(
            client.choose(&accepts_body()),
            Err(PaymentError::NoSupportedNetwork(offered)) if offered == "base-sepolia"
        ));
    }

    #[tokio::test]
    async fn test_pays_after_402_and_retries_once() {
        let (url, seen) = mcp_endpoint(|attempt, request| match sent_payment(request) {
            Some(_) if attempt == 2 => paid_result(),
            _ => payment_required_error(),
        })
        .await;

        let result = paying_client(url, Some("0.05")).call_tool("get_business_news", Some(json!({}))).await.unwrap();
        assert_eq!(result.first_text(), Some("{\"articles\":[]}"));
        assert_eq!(payment_receipt(&result).unwrap().transaction.as_deref(), Some("0xbeef"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(sent_payment(&seen[0]).is_none());

        let payload = sent_payment(&seen[1]).unwrap();
        assert_eq!(payload.network.to_string(), "base-sepolia");
        assert_eq!(seen[1]["params"]["name"], "get_business_news");
    }

    #[tokio::test]
    async fn test_pays_after_error_result_with_offers() {
        let (url, seen) = mcp_endpoint(|attempt, _| {
            if attempt == 1 {
                json!({
                    "result": {
                        "content": [{ "type": "text", "text": "Payment required" }],
                        "isError": true,
                        "_meta": { PAYMENT_ERROR_META_KEY: accepts_body() }
                    }
                })
            } else {
                paid_result()
            }
        })
        .await;

        let result = paying_client(url, None).call_tool("get_business_news", None).await.unwrap();
        assert!(!result.is_error);
        assert!(sent_payment(&seen.lock().unwrap()[1]).is_some());
    }

    #[tokio::test]
    async fn test_second_402_is_rejection() {
        let (url, seen) = mcp_endpoint(|_, _| payment_required_error()).await;

        let err = paying_client(url, None).call_tool("get_business_news", None).await.unwrap_err();
        assert!(matches!(err, PaymentError::Rejected(_)), "{err}");
        // No third attempt
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_offer_over_maximum_is_not_paid() {
        let (url, seen) = mcp_endpoint(|_, _| payment_required_error()).await;

        let err = paying_client(url, Some("0.001")).call_tool("get_business_news", None).await.unwrap_err();
        assert!(matches!(err, PaymentError::ExceedsMaximum { .. }));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/mcp", listener.local_addr().unwrap())).unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let timeout = Duration::from_millis(200);
        let err = paying_client(url, None)
            .call_tool_with_timeout("get_business_news", None, timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Timeout(t) if t == timeout));
    }

    #[test]
    fn test_receipt_accepts_both_hash_keys() {
        let result = ToolCallResult::text("{}").with_meta(json!({
            PAYMENT_RESPONSE_META_KEY: {"success": true, "transactionHash": "0xfeed"}
        }));
        let receipt = payment_receipt(&result).unwrap();
        assert!(receipt.success);
        assert_eq!(receipt.transaction.as_deref(), Some("0xfeed"));
    }
}
