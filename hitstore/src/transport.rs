//! HTTP transport to the cluster
//!
//! Thin JSON-over-HTTP layer. No retry logic lives here; the resilience
//! executor owns classification and retries. `reconnect` rebuilds the
//! underlying client so the executor can recover from wedged connections.

use crate::config::EngineConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::Method;
use serde_json::Value;
use url::Url;

/// A single request to the cluster.
#[derive(Debug, Clone)]
pub struct ClusterRequest {
    pub method: Method,
    /// Path relative to the cluster root, with a leading slash
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Newline-delimited JSON payload (bulk requests)
    pub ndjson: Option<String>,
}

impl ClusterRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            ndjson: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_ndjson(mut self, payload: String) -> Self {
        self.ndjson = Some(payload);
        self
    }
}

/// A response from the cluster: HTTP status plus parsed JSON body.
#[derive(Debug, Clone)]
pub struct ClusterResponse {
    pub status: u16,
    pub body: Value,
}

impl ClusterResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Engine error type, e.g. "index_not_found_exception"
    pub fn error_type(&self) -> Option<&str> {
        self.body["error"]["type"].as_str()
    }

    pub fn reason(&self) -> String {
        self.body["error"]["reason"]
            .as_str()
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.body.to_string())
    }
}

/// Seam between the engine and the wire. Everything above this trait is
/// testable with a scripted in-memory implementation.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn send(&self, request: &ClusterRequest) -> Result<ClusterResponse>;

    /// Tear down and rebuild the underlying connection pool.
    async fn reconnect(&self) -> Result<()>;
}

/// Production transport over reqwest.
pub struct HttpTransport {
    base_url: Url,
    timeout: std::time::Duration,
    client: RwLock<reqwest::Client>,
}

impl HttpTransport {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| Error::Config(format!("invalid base_url '{}': {}", config.base_url, e)))?;
        let timeout = config.timeout();
        let client = Self::build_client(timeout)?;
        Ok(Self {
            base_url,
            timeout,
            client: RwLock::new(client),
        })
    }

    fn build_client(timeout: std::time::Duration) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::from)
    }

    fn url_for(&self, request: &ClusterRequest) -> Result<Url> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| Error::Config(format!("invalid request path '{}': {}", request.path, e)))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl ClusterTransport for HttpTransport {
    async fn send(&self, request: &ClusterRequest) -> Result<ClusterResponse> {
        let client = self.client.read().clone();
        let url = self.url_for(request)?;

        let mut builder = client.request(request.method.clone(), url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(payload) = &request.ndjson {
            builder = builder
                .header("content-type", "application/x-ndjson")
                .body(payload.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ClusterResponse { status, body })
    }

    async fn reconnect(&self) -> Result<()> {
        let fresh = Self::build_client(self.timeout)?;
        *self.client.write() = fresh;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_type_extraction() {
        let response = ClusterResponse {
            status: 404,
            body: json!({"error": {"type": "index_not_found_exception", "reason": "no such index"}}),
        };
        assert_eq!(response.error_type(), Some("index_not_found_exception"));
        assert_eq!(response.reason(), "no such index");
        assert!(!response.is_success());
    }

    #[test]
    fn test_url_building() {
        let config = EngineConfig::new("http://localhost:9200");
        let transport = HttpTransport::new(&config).unwrap();
        let request = ClusterRequest::get("/hits-v1/_doc/h1").with_query("refresh", "true");
        let url = transport.url_for(&request).unwrap();
        assert_eq!(url.as_str(), "http://localhost:9200/hits-v1/_doc/h1?refresh=true");
    }
}
