//! HTTP transport for the FleetDash REST API.
//!
//! One network call per invocation, JSON in and out. Everything above this
//! layer (deduplication, caching, polling) treats `call` as the single
//! primitive that touches the wire.

use std::sync::Arc;

use anyhow::Result;
use reqwest::{header, Client, Method};
use serde_json::Value;
use tracing::debug;

use super::ApiError;

/// Transport over the dashboard REST API.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
///
/// No request timeout is configured: a call stays outstanding until the
/// server answers or the deduplicator aborts it.
#[derive(Clone)]
pub struct Transport {
    client: Client,
    base_url: Arc<String>,
    token: Option<Arc<String>>,
}

impl Transport {
    /// Create a new transport for the given API base URL (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url: Arc::new(base_url.into()),
            token: None,
        })
    }

    /// Set the bearer token for authenticated requests
    pub fn set_token(&mut self, token: impl Into<String>) {
        self.token = Some(Arc::new(token.into()));
    }

    /// Create a new Transport with the given token, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: Arc::clone(&self.base_url),
            token: Some(Arc::new(token.into())),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one request and parse the response body.
    ///
    /// Non-2xx statuses still have their body read and parsed so callers can
    /// inspect structured validation errors. A 204 or empty body yields
    /// `Value::Null`.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(header::ACCEPT, "application/json");

        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        if let Some(body) = body {
            request = request.json(body);
        }

        debug!(method = %method, url = %url, "API request");

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            debug!(method = %method, url = %url, status = %status, "API request failed");
            return Err(ApiError::from_status(status.as_u16(), &text));
        }

        if text.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text).map_err(|e| {
            ApiError::InvalidResponse(format!("failed to parse response from {}: {}", url, e))
        })
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.call(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.call(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.call(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.call(Method::DELETE, path, None).await
    }
}
