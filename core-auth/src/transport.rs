//! Token endpoint transport over the host [`HttpClient`].

use crate::error::TransportError;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Posts token requests and returns the JSON response body.
///
/// Any status outside 200..=399 is a [`TransportError::Status`]; an error
/// body is never parsed as a successful response.
#[derive(Clone)]
pub struct TokenTransport {
    http_client: Arc<dyn HttpClient>,
}

impl TokenTransport {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self { http_client }
    }

    /// POST `params` as `application/x-www-form-urlencoded`.
    #[instrument(skip(self, params), fields(param_count = params.len()))]
    pub async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<Value, TransportError> {
        let encoded = serde_urlencoded::to_string(params)
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        let request = HttpRequest::new(HttpMethod::Post, url)
            .header("Accept", "application/json")
            .form(encoded);

        self.send(request).await
    }

    /// POST `body` as `application/json`.
    #[instrument(skip(self, body))]
    pub async fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        let request = HttpRequest::new(HttpMethod::Post, url)
            .header("Accept", "application/json")
            .json(body)
            .map_err(|e| TransportError::Encode(e.to_string()))?;

        self.send(request).await
    }

    async fn send(&self, request: HttpRequest) -> Result<Value, TransportError> {
        let response = self.http_client.execute(request).await?;
        Self::into_json(response)
    }

    fn into_json(response: HttpResponse) -> Result<Value, TransportError> {
        let status = response.status;

        if !(response.is_success() || response.is_redirect()) {
            let body = response
                .text()
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            warn!(status = status, error = %body, "Token endpoint rejected request");
            return Err(TransportError::Status { status, body });
        }

        debug!(status = status, "Token endpoint responded");
        response
            .json()
            .map_err(|e| TransportError::InvalidBody(e.to_string()))
    }
}
