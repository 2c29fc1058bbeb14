//! HTTP client for a remote x402 facilitator

use std::fmt::{Debug, Display};
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use reqwest::Client;
use url::Url;

use super::types::{SettleRequest, SettleResponse, VerifyRequest, VerifyResponse};

// ============================================================================
// Facilitator Trait
// ============================================================================

/// Verifies and settles payment payloads on behalf of a paid tool
pub trait Facilitator {
    type Error: Debug + Display;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;
}

impl<T: Facilitator + Sync + Send> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(request)
    }
}

// ============================================================================
// FacilitatorClient
// ============================================================================

#[derive(Clone, Debug)]
pub struct FacilitatorClient {
    verify_url: Url,
    settle_url: Url,
    client: Client,
    timeout: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum FacilitatorClientError {
    #[error("URL parse error: {context}: {source}")]
    UrlParse {
        context: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("HTTP error: {context}: {source}")]
    Http {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize JSON: {context}: {source}")]
    JsonDeserialization {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unexpected HTTP status {status}: {context}: {body}")]
    HttpStatus {
        context: &'static str,
        status: StatusCode,
        body: String,
    },
}

impl Facilitator for FacilitatorClient {
    type Error = FacilitatorClientError;

    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        FacilitatorClient::verify(self, request).await
    }

    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        FacilitatorClient::settle(self, request).await
    }
}

impl FacilitatorClient {
    /// `base_url` should end with a slash; endpoints are resolved relative to it
    pub fn try_new(base_url: Url) -> Result<Self, FacilitatorClientError> {
        let join = |path: &str, context: &'static str| {
            base_url
                .join(path)
                .map_err(|source| FacilitatorClientError::UrlParse { context, source })
        };
        Ok(Self {
            verify_url: join("./verify", "Failed to construct ./verify URL")?,
            settle_url: join("./settle", "Failed to construct ./settle URL")?,
            client: crate::http_client(),
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, FacilitatorClientError> {
        self.post_json(&self.verify_url, "POST /verify", &strip_output_schema(request))
            .await
    }

    pub async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, FacilitatorClientError> {
        self.post_json(&self.settle_url, "POST /settle", &strip_output_schema(request))
            .await
    }

    async fn post_json<T, R>(&self, url: &Url, context: &'static str, payload: &T) -> Result<R, FacilitatorClientError>
    where
        T: serde::Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        tracing::debug!(target: "x402-pay", "Facilitator {}", context);
        let mut req = self.client.post(url.clone()).json(payload);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let response = req
            .send()
            .await
            .map_err(|source| FacilitatorClientError::Http { context, source })?;
        handle_response(response, context).await
    }
}

/// Facilitators don't need outputSchema and some reject it
fn strip_output_schema(request: &VerifyRequest) -> VerifyRequest {
    let mut clean = request.clone();
    clean.payment_requirements.output_schema = None;
    clean
}

async fn handle_response<R: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    context: &'static str,
) -> Result<R, FacilitatorClientError> {
    let status = response.status();
    if status == StatusCode::OK {
        return response
            .json::<R>()
            .await
            .map_err(|source| FacilitatorClientError::JsonDeserialization { context, source });
    }
    // Body is best-effort context for the error
    let body = response.text().await.unwrap_or_default();
    Err(FacilitatorClientError::HttpStatus { context, status, body })
}

impl TryFrom<&str> for FacilitatorClient {
    type Error = FacilitatorClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = format!("{}/", value.trim_end_matches('/'));
        let url = Url::parse(&normalized).map_err(|source| FacilitatorClientError::UrlParse {
            context: "Failed to parse base url",
            source,
        })?;
        FacilitatorClient::try_new(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoints_resolve_under_base_path() {
        let client = FacilitatorClient::try_from("https://x402.org/facilitator").unwrap();
        assert_eq!(client.verify_url.as_str(), "https://x402.org/facilitator/verify");
        assert_eq!(client.settle_url.as_str(), "https://x402.org/facilitator/settle");

        let client = FacilitatorClient::try_from("https://example.com/").unwrap();
        assert_eq!(client.verify_url.as_str(), "https://example.com/verify");
    }

    #[test]
    fn test_rejects_bad_url() {
        assert!(matches!(
            FacilitatorClient::try_from("not a url"),
            Err(FacilitatorClientError::UrlParse { .. })
        ));
    }
}
