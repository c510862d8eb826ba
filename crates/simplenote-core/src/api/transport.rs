//! HTTP transport seam.

use async_trait::async_trait;
use reqwest::Client;

use super::request::{ApiRequest, ApiResponse, Method};
use super::{ApiError, ApiResult};
use crate::config::ClientConfig;

/// Sends a single request and returns the raw response.
///
/// Implementations report transport failures as `ApiError::Network` and must
/// not interpret status codes; that is the gateway's job.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    config: ClientConfig,
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { config, client })
    }

}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let url = self.config.endpoint(&request.path).map_err(|error| {
            tracing::warn!(path = %request.path, "Request not sent: {}", error);
            ApiError::network(error.to_string())
        })?;
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        }
        .header(reqwest::header::ACCEPT, "application/json");

        if let Some(token) = request.bearer.as_deref() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body.as_ref() {
            builder = builder.json(body);
        }

        tracing::debug!(method = %request.method, %url, "Sending API request");
        let response = builder.send().await.map_err(|error| {
            tracing::warn!(method = %request.method, %url, "API request failed: {}", error);
            ApiError::from(error)
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        tracing::debug!(method = %request.method, %url, status, "API response received");

        Ok(ApiResponse { status, body })
    }
}
