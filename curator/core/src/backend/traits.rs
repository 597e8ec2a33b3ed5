//! Routing Backend Traits
//!
//! The wire envelope sent to the router, the fields read back from it, and
//! the trait every router client implements.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::agents::{AgentProfile, Payload};

/// Model selection hint sent with every request
pub const ROUTING_STRATEGY: &str = "performance";

/// Remote failover hint: try the next preferred model on failure
pub const FALLBACK_STRATEGY: &str = "cascade";

/// Request envelope for `POST /route`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteRequest {
    /// Prompt text
    pub prompt: String,
    /// Caller context (empty object when absent)
    pub context: Payload,
    /// Acceptable models, first preferred
    pub model_preferences: Vec<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Output length cap
    pub max_tokens: u32,
    /// System prompt
    pub system_prompt: String,
    /// Always [`ROUTING_STRATEGY`]
    pub routing_strategy: String,
    /// Always [`FALLBACK_STRATEGY`]
    pub fallback_strategy: String,
}

impl RouteRequest {
    /// Envelope for `prompt` using a profile's model settings
    pub fn new(prompt: impl Into<String>, profile: &AgentProfile) -> Self {
        Self {
            prompt: prompt.into(),
            context: Payload::new(),
            model_preferences: vec![profile.model.clone()],
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
            system_prompt: profile.system_prompt.clone(),
            routing_strategy: ROUTING_STRATEGY.to_string(),
            fallback_strategy: FALLBACK_STRATEGY.to_string(),
        }
    }

    /// Set the context map
    #[must_use]
    pub fn with_context(mut self, context: Payload) -> Self {
        self.context = context;
        self
    }

    /// Replace the model preference list (ignored when empty)
    #[must_use]
    pub fn with_model_preferences<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let models: Vec<String> = models.into_iter().map(Into::into).collect();
        if !models.is_empty() {
            self.model_preferences = models;
        }
        self
    }
}

/// Fields consumed from a router response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteResponse {
    /// Model output, expected to hold task-specific JSON
    #[serde(default, deserialize_with = "content_text")]
    pub content: String,
    /// Model the router actually used
    #[serde(default = "unknown_model")]
    pub model_used: String,
    /// Tokens consumed
    #[serde(default)]
    pub tokens_used: u64,
}

impl RouteResponse {
    /// Response with the given content and model
    pub fn new(content: impl Into<String>, model_used: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model_used: model_used.into(),
            tokens_used: 0,
        }
    }

    /// Set the token count
    #[must_use]
    pub fn with_tokens(mut self, tokens_used: u64) -> Self {
        self.tokens_used = tokens_used;
        self
    }
}

fn unknown_model() -> String {
    "unknown".to_string()
}

// Some routers return already-decoded JSON in `content`; keep it as text
fn content_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Transport-level routing failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    /// Connection refused, reset, DNS failure
    #[error("router unreachable: {0}")]
    Network(String),

    /// Non-2xx HTTP status
    #[error("router returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Request exceeded the client timeout
    #[error("router request timed out")]
    Timeout,

    /// 2xx response whose body could not be decoded
    #[error("invalid router response: {0}")]
    InvalidResponse(String),

    /// Client could not be constructed or the request could not be built
    #[error("router client error: {0}")]
    Client(String),
}

/// Router client
///
/// Implementations must be safe to call concurrently and must not retry on
/// their own; retry policy belongs to the caller.
#[async_trait]
pub trait RoutingBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Send one envelope and return the router's answer
    async fn route(&self, request: &RouteRequest) -> Result<RouteResponse, RoutingError>;

    /// Whether the router is reachable
    async fn health_check(&self) -> bool {
        true
    }

    /// Release connections; called once on pool shutdown
    async fn close(&self) {}
}
