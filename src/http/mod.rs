//! The HTTP capability consumed by mockend: fetching remote fixtures and proxying to a live origin.
//!
//! mockend never speaks HTTP itself, it only calls into an [`HttpClient`]. [`ReqwestClient`] is the
//! production implementation, [`mock::MockHttpClient`] the one used by tests.
use std::{collections::HashMap, fmt::Debug};

use async_trait::async_trait;
use serde_json::Value;
use tracing::instrument;

use crate::error::Result;

pub mod mock;

/// What an [`HttpClient`] hands back, whatever the status code
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub data: Value,
    pub headers: HashMap<String, String>,
}

impl HttpResponse {
    pub fn new(status: u16, data: Value) -> Self {
        Self {
            status,
            data,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Case insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait that defines which functions an HTTP client needs to implement.
///
/// Implementations must return `Ok` for every response the origin produced (4xx and 5xx included)
/// and only fail when no response could be obtained at all.
#[async_trait]
pub trait HttpClient: Debug + Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse>;
    async fn post(&self, url: &str, body: &Value) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by [`reqwest`]
#[derive(Clone, Debug, Default)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

impl ReqwestClient {
    pub fn new(inner: reqwest::Client) -> Self {
        Self { inner }
    }

    async fn into_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let text = response.text().await?;
        let data = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(HttpResponse {
            status,
            data,
            headers,
        })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    #[instrument(name = "http::get", level = "info", skip(self))]
    async fn get(&self, url: &str) -> Result<HttpResponse> {
        let response = self.inner.get(url).send().await?;
        Self::into_response(response).await
    }

    #[instrument(name = "http::post", level = "info", skip(self, body))]
    async fn post(&self, url: &str, body: &Value) -> Result<HttpResponse> {
        let response = self.inner.post(url).json(body).send().await?;
        Self::into_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::HttpResponse;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(201, json!(null)).with_header("Location", "/api/tasks/7");
        assert_eq!(response.header("location"), Some("/api/tasks/7"));
        assert_eq!(response.header("LOCATION"), Some("/api/tasks/7"));
        assert!(response.header("etag").is_none());
        assert!(response.is_success());
        assert!(!HttpResponse::new(404, json!(null)).is_success());
    }
}
