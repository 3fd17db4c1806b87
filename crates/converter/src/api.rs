//! REST client for the converter dispatcher.

use std::time::Duration;

use serde::Deserialize;

use crate::payload::DispatchRequest;

/// HTTP client for the dispatcher in front of the conversion fleet.
pub struct ConverterApi {
    client: reqwest::Client,
    api_url: String,
}

/// Acknowledgment returned by `POST /dispatch` once the batch is queued.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    /// Dispatcher-assigned handle for the queued batch.
    pub handle: String,
}

/// Errors from the converter REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ConverterApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The dispatcher returned a non-2xx status code.
    #[error("Converter API error ({status}): {body}")]
    ApiError { status: u16, body: String },
}

impl ConverterApiError {
    /// Whether another attempt could succeed.
    ///
    /// Transport failures, throttling and server errors are retryable. Any
    /// other 4xx means the dispatcher refused the request itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::ApiError { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

impl ConverterApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://dispatcher:8080`.
    pub fn new(api_url: String, timeout: Duration) -> Result<Self, ConverterApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Submit one batch for conversion.
    ///
    /// Returns as soon as the dispatcher acknowledges the batch.
    pub async fn submit(
        &self,
        request: &DispatchRequest,
    ) -> Result<SubmitResponse, ConverterApiError> {
        let response = self
            .client
            .post(format!("{}/dispatch", self.api_url))
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ConverterApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ConverterApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ConverterApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
