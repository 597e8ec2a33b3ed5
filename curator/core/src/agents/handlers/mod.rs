//! Task Handlers
//!
//! One [`TaskHandler`] per [`AgentType`]. A handler builds its prompt from
//! the request input and the static brand context, calls the router through
//! [`HandlerContext::route`], and turns the raw model output into a result
//! payload. Unparseable output never fails a request: the handler returns a
//! well-formed fallback marked as degraded.
//!
//! # Dispatch
//!
//! ```text
//!   Worker ──► HandlerRegistry[agent_type] ──► Arc<dyn TaskHandler>
//!                                                     │
//!                                     handle(ctx) ◄───┘
//! ```
//!
//! Adding a task type means adding an enum variant and registering one
//! handler; the worker and pool never change.

mod analytics;
mod brand_voice;
mod compliance;
mod content;
mod health_claims;
mod moderation;
mod scheduler;
mod social;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::guidelines::{AgentProfile, BrandGuidelines, PlatformCatalog};
use super::types::{AgentType, Payload};
use super::worker::WorkerServices;
use super::AgentError;
use crate::backend::{RetryConfig, RouteRequest, RouteResponse, RoutingBackend};

pub use analytics::AnalyticsProcessor;
pub use brand_voice::BrandVoiceValidator;
pub use compliance::ComplianceChecker;
pub use content::ContentCreator;
pub use health_claims::HealthClaimsValidator;
pub use moderation::ContentModerator;
pub use scheduler::SchedulerOptimizer;
pub use social::SocialMediaOptimizer;

// ============================================================================
// Handler Output
// ============================================================================

/// Result payload produced by a handler
#[derive(Clone, Debug, PartialEq)]
pub struct HandlerOutput {
    /// The result payload
    pub payload: Payload,
    /// Whether the payload is a fallback built from unparseable output
    pub degraded: bool,
}

impl HandlerOutput {
    /// A fully structured result
    #[must_use]
    pub fn structured(payload: Payload) -> Self {
        Self {
            payload,
            degraded: false,
        }
    }

    /// A degraded fallback result
    #[must_use]
    pub fn degraded(payload: Payload) -> Self {
        Self {
            payload,
            degraded: true,
        }
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// Task-specific processing capability
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The agent type this handler serves
    fn agent_type(&self) -> AgentType;

    /// Produce a result for one request
    async fn handle(&self, ctx: &HandlerContext<'_>) -> Result<HandlerOutput, AgentError>;

    /// Task-specific confidence signal read from a result, if any
    fn confidence(&self, _result: &Payload) -> Option<f64> {
        None
    }
}

// ============================================================================
// Handler Context
// ============================================================================

/// Everything a handler may read while processing one request
pub struct HandlerContext<'a> {
    /// Worker running the handler
    pub worker_id: &'a str,
    /// Agent type of the request
    pub agent_type: AgentType,
    /// Request input
    pub input: &'a Payload,
    /// Request context (empty when the request had none)
    pub context: &'a Payload,
    /// Brand guidelines
    pub guidelines: &'a BrandGuidelines,
    /// Social platform constraints
    pub platforms: &'a PlatformCatalog,
    profile: AgentProfile,
    backend: &'a dyn RoutingBackend,
    retry: &'a RetryConfig,
    max_retries: u32,
}

impl fmt::Debug for HandlerContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("worker_id", &self.worker_id)
            .field("agent_type", &self.agent_type)
            .field("backend", &self.backend.name())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl<'a> HandlerContext<'a> {
    /// Context for one request on one worker
    #[must_use]
    pub fn new(
        worker_id: &'a str,
        agent_type: AgentType,
        input: &'a Payload,
        context: &'a Payload,
        services: &'a WorkerServices,
        max_retries: u32,
    ) -> Self {
        Self {
            worker_id,
            agent_type,
            input,
            context,
            guidelines: &services.guidelines,
            platforms: &services.platforms,
            profile: services.profiles.get(agent_type),
            backend: services.backend.as_ref(),
            retry: &services.retry,
            max_retries,
        }
    }

    /// Model settings for this agent type
    #[must_use]
    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// String input field, or `default` when missing or not a string
    #[must_use]
    pub fn input_str<'s>(&'s self, key: &str, default: &'s str) -> &'s str {
        self.input
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(default)
    }

    /// Structured input field, or an empty object
    #[must_use]
    pub fn input_value(&self, key: &str) -> Value {
        self.input
            .get(key)
            .cloned()
            .unwrap_or_else(|| Value::Object(Payload::new()))
    }

    /// `{<verb>_by: worker, <verb>_at: now}` provenance block
    #[must_use]
    pub fn provenance(&self, verb: &str) -> Payload {
        let mut metadata = Payload::new();
        metadata.insert(format!("{verb}_by"), Value::from(self.worker_id));
        metadata.insert(
            format!("{verb}_at"),
            Value::from(chrono::Utc::now().to_rfc3339()),
        );
        metadata
    }

    /// Send a prompt to the router
    ///
    /// `preferences` overrides the profile's single default model when
    /// non-empty. Retryable failures are re-issued up to the request's retry
    /// budget with exponential backoff; the caller's timeout bounds the
    /// whole loop.
    pub async fn route(&self, prompt: String, preferences: &[&str]) -> Result<RouteResponse, AgentError> {
        let request = RouteRequest::new(prompt, &self.profile)
            .with_context(self.context.clone())
            .with_model_preferences(preferences.iter().copied());

        let mut attempt = 0;
        loop {
            match self.backend.route(&request).await {
                Ok(response) => {
                    tracing::debug!(
                        worker_id = self.worker_id,
                        model = %response.model_used,
                        tokens = response.tokens_used,
                        "Router call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) if attempt < self.max_retries && self.retry.is_retryable(&e) => {
                    let backoff = self.retry.backoff_for_attempt(attempt);
                    tracing::warn!(
                        worker_id = self.worker_id,
                        agent_type = %self.agent_type,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Router call failed, retrying after backoff"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(AgentError::Routing(e)),
            }
        }
    }
}

// ============================================================================
// Output Parsing
// ============================================================================

/// Why model output could not be used as structured data
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Not valid JSON
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Valid JSON, but not an object
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

/// Parse model output as a JSON object
///
/// Accepts bare JSON, JSON wrapped in Markdown code fences, and JSON with
/// surrounding prose (the outermost `{...}` span is tried last).
pub fn parse_structured(raw: &str) -> Result<Payload, ParseError> {
    let text = strip_fences(raw.trim());

    let value = match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(err) => match (text.find('{'), text.rfind('}')) {
            (Some(start), Some(end)) if start < end => {
                serde_json::from_str::<Value>(&text[start..=end]).map_err(|_| err)?
            }
            _ => return Err(err.into()),
        },
    };

    match value {
        Value::Object(map) => Ok(map),
        Value::Array(_) => Err(ParseError::NotAnObject("array")),
        Value::String(_) => Err(ParseError::NotAnObject("string")),
        Value::Number(_) => Err(ParseError::NotAnObject("number")),
        Value::Bool(_) => Err(ParseError::NotAnObject("bool")),
        Value::Null => Err(ParseError::NotAnObject("null")),
    }
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (```json) up to the first newline
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Attach metadata to parsed output, or build the degraded fallback
pub(crate) fn finish_routed<F>(
    ctx: &HandlerContext<'_>,
    response: RouteResponse,
    mut metadata: Payload,
    fallback: F,
) -> HandlerOutput
where
    F: FnOnce(&str) -> Payload,
{
    metadata.insert("model_used".into(), Value::from(response.model_used.clone()));
    metadata.insert("tokens_used".into(), Value::from(response.tokens_used));

    match parse_structured(&response.content) {
        Ok(mut payload) => {
            payload.insert("metadata".into(), Value::Object(metadata));
            HandlerOutput::structured(payload)
        }
        Err(err) => {
            tracing::warn!(
                worker_id = ctx.worker_id,
                agent_type = %ctx.agent_type,
                error = %err,
                "Model output was not structured, returning degraded result"
            );
            let mut payload = fallback(&response.content);
            payload.insert("raw_output".into(), Value::from(response.content));
            metadata.insert("degraded".into(), Value::Bool(true));
            payload.insert("metadata".into(), Value::Object(metadata));
            HandlerOutput::degraded(payload)
        }
    }
}

/// Unwrap a `json!` object literal
pub(crate) fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Dispatch table from agent type to handler
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<AgentType, Arc<dyn TaskHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("HandlerRegistry")
            .field("agent_types", &types)
            .finish()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl HandlerRegistry {
    /// Registry with no handlers
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with the built-in handler for every agent type
    #[must_use]
    pub fn standard() -> Self {
        Self::empty()
            .with_handler(ContentCreator)
            .with_handler(ComplianceChecker)
            .with_handler(BrandVoiceValidator)
            .with_handler(SocialMediaOptimizer)
            .with_handler(HealthClaimsValidator)
            .with_handler(ContentModerator)
            .with_handler(AnalyticsProcessor)
            .with_handler(SchedulerOptimizer)
    }

    /// Register a handler, replacing any previous one for its agent type
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.insert(handler.agent_type(), handler)
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with_handler(mut self, handler: impl TaskHandler + 'static) -> Self {
        self.register(Arc::new(handler));
        self
    }

    /// Handler for an agent type
    #[must_use]
    pub fn get(&self, agent_type: AgentType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&agent_type).cloned()
    }

    /// Whether a handler is registered for an agent type
    #[must_use]
    pub fn contains(&self, agent_type: AgentType) -> bool {
        self.handlers.contains_key(&agent_type)
    }

    /// Registered agent types, sorted
    #[must_use]
    pub fn agent_types(&self) -> Vec<AgentType> {
        let mut types: Vec<_> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{services, ScriptedRouter};
    use super::*;
    use crate::backend::RoutingError;
    use serde_json::json;

    #[test]
    fn test_parse_bare_and_fenced_json() {
        assert_eq!(parse_structured(r#"{"a": 1}"#).unwrap()["a"], 1);
        assert_eq!(parse_structured("```json\n{\"a\": 2}\n```").unwrap()["a"], 2);
        assert_eq!(parse_structured("```\n{\"a\": 3}\n```\n").unwrap()["a"], 3);
        assert_eq!(
            parse_structured("Here is the analysis:\n{\"a\": 4}\nThanks!").unwrap()["a"],
            4
        );
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(matches!(parse_structured("[1, 2]"), Err(ParseError::NotAnObject("array"))));
        assert!(matches!(parse_structured("plain words"), Err(ParseError::Json(_))));
        assert!(parse_structured("").is_err());
    }

    #[test]
    fn test_standard_registry_covers_every_type() {
        let registry = HandlerRegistry::standard();
        assert_eq!(registry.agent_types(), AgentType::ALL.to_vec());
        for agent_type in AgentType::ALL {
            assert_eq!(registry.get(agent_type).unwrap().agent_type(), agent_type);
        }
        assert!(HandlerRegistry::empty().get(AgentType::ContentCreator).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_retries_retryable_errors_within_budget() {
        let router = ScriptedRouter::failing(RoutingError::Status {
            status: 503,
            body: String::new(),
        });
        let services = services(router.clone());
        let input = Payload::new();
        let context = Payload::new();
        let ctx = HandlerContext::new("w-1", AgentType::ContentModerator, &input, &context, &services, 2);

        let err = ctx.route("prompt".to_string(), &[]).await.unwrap_err();
        assert!(matches!(err, AgentError::Routing(RoutingError::Status { status: 503, .. })));
        assert_eq!(router.calls(), 3);
    }

    #[tokio::test]
    async fn test_route_does_not_retry_without_budget() {
        let router = ScriptedRouter::failing(RoutingError::Network("refused".into()));
        let services = services(router.clone());
        let input = Payload::new();
        let context = Payload::new();
        let ctx = HandlerContext::new("w-1", AgentType::ContentModerator, &input, &context, &services, 0);

        assert!(ctx.route("prompt".to_string(), &[]).await.is_err());
        assert_eq!(router.calls(), 1);
    }

    #[tokio::test]
    async fn test_route_does_not_retry_permanent_errors() {
        let router = ScriptedRouter::failing(RoutingError::Status {
            status: 400,
            body: "bad request".into(),
        });
        let services = services(router.clone());
        let input = Payload::new();
        let context = Payload::new();
        let ctx = HandlerContext::new("w-1", AgentType::ContentModerator, &input, &context, &services, 5);

        assert!(ctx.route("prompt".to_string(), &[]).await.is_err());
        assert_eq!(router.calls(), 1);
    }

    #[tokio::test]
    async fn test_route_envelope_uses_profile_and_context() {
        let router = ScriptedRouter::replying("{}");
        let services = services(router.clone());
        let input = Payload::new();
        let context = object(json!({"campaign": "spring"}));
        let ctx = HandlerContext::new("w-1", AgentType::ComplianceChecker, &input, &context, &services, 0);

        ctx.route("check".to_string(), &[]).await.unwrap();

        let seen = router.seen.lock();
        let envelope = &seen[0];
        assert_eq!(envelope.context["campaign"], "spring");
        assert_eq!(envelope.model_preferences, vec![ctx.profile().model.clone()]);
        assert_eq!(envelope.max_tokens, ctx.profile().max_tokens);
    }
}
