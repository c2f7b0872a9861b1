//! Outbound HTTP transport
//!
//! Token exchange and uploads only ever issue POST requests, so the transport
//! boundary is a single `post` call. Every call is bounded by a wall-clock
//! budget covering both sending the request and reading the response body.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::{PublishError, Result};

/// A fully materialised POST request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body of a completed request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, replacing invalid UTF-8
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Transport used by the token exchanger and the upload dispatcher.
///
/// Implementations return `Ok` for any response that arrived (whatever its
/// status) and `Network`/`Timeout` errors when no response arrived.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// reqwest-based transport with a per-request deadline
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .body(request.body)
            .send()
            .await
            .map_err(|e| PublishError::Network {
                url: url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| PublishError::Network {
                url: url.clone(),
                message: format!("Failed to read response body: {}", e),
            })?
            .to_vec();

        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        debug!(
            "POST {} ({} bytes, content-type: {})",
            url,
            request.body.len(),
            request.header_value("content-type").unwrap_or("none")
        );

        match tokio::time::timeout(self.timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(PublishError::Timeout {
                url,
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_server;
    use axum::{routing::post, Router};
    use std::time::Instant;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = HttpRequest::new("https://example.test", Vec::new())
            .header("Content-Type", "application/octet-stream");
        assert_eq!(
            request.header_value("content-type"),
            Some("application/octet-stream")
        );
        assert_eq!(request.header_value("authorization"), None);
    }

    #[tokio::test]
    async fn test_post_returns_non_success_status_as_response() {
        let app = Router::new().route(
            "/missing",
            post(|| async { (axum::http::StatusCode::NOT_FOUND, "no such bucket") }),
        );
        let base = spawn_server(app).await;

        let transport = ReqwestTransport::new(Duration::from_secs(5));
        let response = transport
            .post(HttpRequest::new(format!("{}/missing", base), b"data".to_vec()))
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert_eq!(response.text(), "no such bucket");
    }

    #[tokio::test]
    async fn test_post_sends_headers_and_body() {
        let app = Router::new().route(
            "/echo",
            post(|headers: axum::http::HeaderMap, body: axum::body::Bytes| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                format!("{}|{}", auth, String::from_utf8_lossy(&body))
            }),
        );
        let base = spawn_server(app).await;

        let transport = ReqwestTransport::new(Duration::from_secs(5));
        let response = transport
            .post(
                HttpRequest::new(format!("{}/echo", base), b"payload".to_vec())
                    .header("Authorization", "Bearer abc"),
            )
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.text(), "Bearer abc|payload");
    }

    #[tokio::test]
    async fn test_post_times_out_within_budget() {
        let app = Router::new().route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "too late"
            }),
        );
        let base = spawn_server(app).await;

        let budget = Duration::from_millis(300);
        let transport = ReqwestTransport::new(budget);
        let started = Instant::now();
        let result = transport
            .post(HttpRequest::new(format!("{}/slow", base), Vec::new()))
            .await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(PublishError::Timeout { .. })));
        assert!(elapsed >= budget, "returned early after {:?}", elapsed);
        assert!(
            elapsed < Duration::from_secs(3),
            "overshot budget: {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_post_reports_connection_failure_as_network_error() {
        // Bind and drop a listener so the port is closed
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::new(Duration::from_secs(5));
        let result = transport
            .post(HttpRequest::new(format!("http://{}/token", addr), Vec::new()))
            .await;

        assert!(matches!(result, Err(PublishError::Network { .. })));
    }
}
