//! Common utilities for the SLB API client
//!
//! Provides the authenticated request plumbing shared by all SLB operations.

use crate::auth::TokenSource;
use crate::error::SlbError;
use crate::models::ApiResponse;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// HTTP client wrapper with bearer authentication
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, SlbError> {
        let token = self.tokens.token().await?;
        Ok(self.client
            .request(method, self.build_url(path))
            .bearer_auth(token)
            .header("Accept", "application/json"))
    }

    /// Send a request and unwrap the response envelope
    ///
    /// Returns the envelope payload, which is `None` for endpoints that only
    /// acknowledge the operation.
    async fn execute<T: DeserializeOwned>(
        &self,
        method: &Method,
        path: &str,
        builder: RequestBuilder,
    ) -> Result<Option<T>, SlbError> {
        let response = builder.send().await.map_err(SlbError::Http)?;

        let status = response.status();
        if !status.is_success() {
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                // The next request exchanges a fresh token
                self.tokens.invalidate().await;
            }
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(method, path, status, body));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }

        let envelope: ApiResponse<T> = serde_json::from_str(&text).map_err(|e| {
            SlbError::Api(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })?;

        if !envelope.is_success() {
            return Err(SlbError::Api(format!(
                "{} {} rejected: code {} - {}",
                method,
                path,
                envelope.code,
                envelope.message.unwrap_or_default()
            )));
        }

        Ok(envelope.data)
    }

    /// Make a GET request; a missing payload is an error
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, SlbError> {
        debug!("GET {}", self.build_url(path));
        let builder = self.request(Method::GET, path).await?;
        self.execute(&Method::GET, path, builder)
            .await?
            .ok_or_else(|| SlbError::NotFound(format!("{} returned no data", path)))
    }

    /// Make a GET request for a collection; a missing payload is an empty list
    pub async fn get_list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, SlbError> {
        debug!("GET {}", self.build_url(path));
        let builder = self.request(Method::GET, path).await?;
        Ok(self.execute(&Method::GET, path, builder).await?.unwrap_or_default())
    }

    /// Make a POST request
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, SlbError> {
        debug!("POST {} with body: {}", self.build_url(path), serde_json::to_string(body)?);
        let builder = self.request(Method::POST, path).await?.json(body);
        self.execute(&Method::POST, path, builder).await
    }

    /// Make a PUT request
    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, SlbError> {
        debug!("PUT {} with body: {}", self.build_url(path), serde_json::to_string(body)?);
        let builder = self.request(Method::PUT, path).await?.json(body);
        self.execute(&Method::PUT, path, builder).await
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<(), SlbError> {
        debug!("DELETE {}", self.build_url(path));
        let builder = self.request(Method::DELETE, path).await?;
        self.execute::<serde_json::Value>(&Method::DELETE, path, builder).await?;
        Ok(())
    }
}

/// Map a non-success HTTP status onto the client error taxonomy
fn classify_status(method: &Method, path: &str, status: StatusCode, body: String) -> SlbError {
    let detail = format!("{} {} failed: {} - {}", method, path, status, body);
    match status {
        StatusCode::NOT_FOUND => SlbError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SlbError::Authentication(detail),
        s if s.is_server_error() => SlbError::Unavailable(detail),
        _ => SlbError::Api(detail),
    }
}

/// Percent-encode a single path segment
pub fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
