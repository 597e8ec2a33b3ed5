//! Requesty Router Client
//!
//! HTTP client for a requesty.ai-style model router.
//!
//! # Router API
//!
//! - `POST /route` - route a prompt to the best available model
//! - `GET /health` - liveness probe
//!
//! Any non-2xx answer is a [`RoutingError::Status`]. The client keeps one
//! pooled `reqwest::Client` and no other state, so it can be shared freely.

use std::time::Duration;

use async_trait::async_trait;

use super::traits::{RouteRequest, RouteResponse, RoutingBackend, RoutingError};

/// Default router base URL
pub const DEFAULT_ROUTER_URL: &str = "https://api.requesty.ai";

const MAX_ERROR_BODY: usize = 512;

/// Connection settings for [`RequestyClient`]
#[derive(Clone, Debug, PartialEq)]
pub struct RequestyConfig {
    /// Router base URL, without trailing slash
    pub base_url: String,
    /// Bearer token
    pub api_key: Option<String>,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for RequestyConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ROUTER_URL.to_string(),
            api_key: None,
            request_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl RequestyConfig {
    /// Settings from `REQUESTY_BASE_URL` and `REQUESTY_API_KEY`
    #[must_use]
    pub fn from_env() -> Self {
        let base_url = std::env::var("REQUESTY_BASE_URL")
            .or_else(|_| std::env::var("CURATOR_ROUTER_URL"))
            .unwrap_or_else(|_| DEFAULT_ROUTER_URL.to_string());
        let api_key = std::env::var("REQUESTY_API_KEY")
            .ok()
            .filter(|k| !k.is_empty());

        Self {
            base_url,
            api_key,
            ..Self::default()
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the request timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Router client over HTTP
#[derive(Clone)]
pub struct RequestyClient {
    base_url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for RequestyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestyClient")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RequestyClient {
    /// Build a client
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::Client` if the HTTP client cannot be built.
    pub fn new(config: RequestyConfig) -> Result<Self, RoutingError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RoutingError::Client(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            http_client,
        })
    }

    /// Router base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn route_url(&self) -> String {
        format!("{}/route", self.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

fn transport_error(error: reqwest::Error) -> RoutingError {
    if error.is_timeout() {
        RoutingError::Timeout
    } else if error.is_builder() {
        RoutingError::Client(error.to_string())
    } else {
        RoutingError::Network(error.to_string())
    }
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}

#[async_trait]
impl RoutingBackend for RequestyClient {
    fn name(&self) -> &str {
        "requesty"
    }

    async fn route(&self, request: &RouteRequest) -> Result<RouteResponse, RoutingError> {
        let mut builder = self.http_client.post(self.route_url()).json(request);
        if let Some(ref api_key) = self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Router returned error status");
            return Err(RoutingError::Status {
                status: status.as_u16(),
                body: truncate(body),
            });
        }

        response
            .json::<RouteResponse>()
            .await
            .map_err(|e| RoutingError::InvalidResponse(e.to_string()))
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(self.health_url())
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentProfile, AgentType};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// One-shot HTTP responder; hands back the raw request it received
    async fn serve_once(status_line: &'static str, body: String) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];

            // Read headers, then exactly Content-Length bytes of body
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }

            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
        });

        (format!("http://{addr}"), rx)
    }

    fn request() -> RouteRequest {
        RouteRequest::new("Write a post", &AgentProfile::for_agent(AgentType::ContentCreator))
            .with_model_preferences(["gpt-4", "claude-3-opus"])
    }

    #[tokio::test]
    async fn test_route_posts_envelope() {
        let body = json!({"content": "{\"title\":\"t\"}", "model_used": "gpt-4", "tokens_used": 42}).to_string();
        let (url, received) = serve_once("200 OK", body).await;

        let client =
            RequestyClient::new(RequestyConfig::default().with_base_url(url).with_api_key("secret")).unwrap();
        let response = client.route(&request()).await.unwrap();

        assert_eq!(response.model_used, "gpt-4");
        assert_eq!(response.tokens_used, 42);
        assert_eq!(response.content, r#"{"title":"t"}"#);

        let raw = received.await.unwrap();
        assert!(raw.starts_with("POST /route HTTP/1.1"));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer secret"));
        assert!(raw.contains(r#""routing_strategy":"performance""#));
        assert!(raw.contains(r#""fallback_strategy":"cascade""#));
        assert!(raw.contains(r#""model_preferences":["gpt-4","claude-3-opus"]"#));
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let (url, _received) = serve_once("503 Service Unavailable", r#"{"error":"busy"}"#.to_string()).await;
        let client = RequestyClient::new(RequestyConfig::default().with_base_url(url)).unwrap();

        let err = client.route(&request()).await.unwrap_err();
        assert_eq!(
            err,
            RoutingError::Status {
                status: 503,
                body: r#"{"error":"busy"}"#.to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid_response() {
        let (url, _received) = serve_once("200 OK", "not json".to_string()).await;
        let client = RequestyClient::new(RequestyConfig::default().with_base_url(url)).unwrap();

        let err = client.route(&request()).await.unwrap_err();
        assert!(matches!(err, RoutingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client =
            RequestyClient::new(RequestyConfig::default().with_base_url(format!("http://{addr}"))).unwrap();
        let err = client.route(&request()).await.unwrap_err();
        assert!(matches!(err, RoutingError::Network(_)), "got {err:?}");
        assert!(!client.health_check().await);
    }

    #[test]
    fn test_trailing_slash_trimmed_and_key_redacted() {
        let client = RequestyClient::new(
            RequestyConfig::default()
                .with_base_url("http://router.local/")
                .with_api_key("secret"),
        )
        .unwrap();
        assert_eq!(client.route_url(), "http://router.local/route");
        assert!(!format!("{client:?}").contains("secret"));
    }

    #[test]
    fn test_truncate_long_bodies() {
        let body = "x".repeat(2000);
        let cut = truncate(body);
        assert_eq!(cut.len(), MAX_ERROR_BODY + 3);
    }
}
