//! MCP (Model Context Protocol) over two transports
//!
//! - [`client`]: streamable-HTTP client for upstream tool servers
//! - [`payment`]: x402 negotiation on top of the client
//! - [`server`]: the paid stdio server exposing the opportunity tool

pub mod client;
pub mod payment;
pub mod protocol;
pub mod server;

pub use client::{McpClient, McpError};
pub use payment::{PaymentClient, PaymentError, PaymentReceipt};
pub use protocol::ToolCallResult;
pub use server::{McpServer, TOOL_NAME, TOOL_PRICE_USD, tool_paywall};
