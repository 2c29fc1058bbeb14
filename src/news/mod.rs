//! Business news acquisition and normalization

pub mod fetch;
pub mod normalize;

pub use fetch::{McpNewsSource, NEWS_CALL_TIMEOUT, NEWS_TOOL_NAME, SigningKeys};
pub use normalize::{MAX_SUMMARY_CHARS, NormalizedArticle, UpstreamPayload, normalize};
