//! Agent Request/Response Types
//!
//! Value types that flow through the pool: the task-type enumeration, the
//! worker status state machine, and the immutable request/response pair.
//!
//! # Worker Status
//!
//! ```text
//!            dispatch              outcome
//!   IDLE ─────────────► PROCESSING ───────► COMPLETED | FAILED | TIMEOUT
//!    ▲                                                   │
//!    └──────────────────── return to pool ───────────────┘
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Structured map carried as request input, context and result payload
pub type Payload = serde_json::Map<String, Value>;

/// Default timeout budget for a request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Identifier used on responses that never reached a worker
pub const UNASSIGNED_AGENT_ID: &str = "unassigned";

/// Metadata key carrying the cache-hit flag on every response
pub const CACHE_HIT_KEY: &str = "cache_hit";

// ============================================================================
// Agent Type
// ============================================================================

/// Category of content-processing work, fixed per worker
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Generates long-form or short-form content from a brief
    ContentCreator,
    /// Checks content against health-claim regulation and brand rules
    ComplianceChecker,
    /// Scores content against the brand voice and tone
    BrandVoiceValidator,
    /// Rewrites content for a specific social platform
    SocialMediaOptimizer,
    /// Extracts and validates health claims
    HealthClaimsValidator,
    /// Flags inappropriate or unsafe content
    ContentModerator,
    /// Summarizes analytics data (local, no routing call)
    AnalyticsProcessor,
    /// Optimizes a publishing schedule (local, no routing call)
    SchedulerOptimizer,
}

impl AgentType {
    /// Every agent type, in declaration order
    pub const ALL: [AgentType; 8] = [
        Self::ContentCreator,
        Self::ComplianceChecker,
        Self::BrandVoiceValidator,
        Self::SocialMediaOptimizer,
        Self::HealthClaimsValidator,
        Self::ContentModerator,
        Self::AnalyticsProcessor,
        Self::SchedulerOptimizer,
    ];

    /// Stable snake_case name, matching the serialized form
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentCreator => "content_creator",
            Self::ComplianceChecker => "compliance_checker",
            Self::BrandVoiceValidator => "brand_voice_validator",
            Self::SocialMediaOptimizer => "social_media_optimizer",
            Self::HealthClaimsValidator => "health_claims_validator",
            Self::ContentModerator => "content_moderator",
            Self::AnalyticsProcessor => "analytics_processor",
            Self::SchedulerOptimizer => "scheduler_optimizer",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown agent type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown agent type: {0}")]
pub struct UnknownAgentType(pub String);

impl FromStr for AgentType {
    type Err = UnknownAgentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownAgentType(s.to_string()))
    }
}

// ============================================================================
// Agent Status
// ============================================================================

/// Worker status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum AgentStatus {
    /// Waiting in the pool
    Idle = 0,
    /// Dispatched to a request
    Processing = 1,
    /// Finished with a result
    Completed = 2,
    /// Finished with an error
    Failed = 3,
    /// Exceeded the request's timeout budget
    Timeout = 4,
}

impl AgentStatus {
    /// Every status, in state-machine order
    pub const ALL: [AgentStatus; 5] = [
        Self::Idle,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Timeout,
    ];

    /// Whether this is an outcome status (a worker may return to the pool)
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Timeout)
    }

    /// Whether `self -> next` is a legal worker transition
    #[must_use]
    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        match (self, next) {
            (Self::Idle, Self::Processing) => true,
            (Self::Processing, n) => n.is_terminal(),
            (s, Self::Idle) => s.is_terminal(),
            _ => false,
        }
    }

    /// Stable snake_case name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Processing,
            2 => Self::Completed,
            3 => Self::Failed,
            4 => Self::Timeout,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Agent Request
// ============================================================================

/// A unit of work submitted to the pool
///
/// Only `agent_type`, `input_data` and `context` influence the result (and
/// therefore the cache key). `priority`, `timeout`, `max_retries` and
/// `metadata` steer scheduling and bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Which kind of worker handles this request
    pub agent_type: AgentType,

    /// Task inputs
    #[serde(default)]
    pub input_data: Payload,

    /// Optional caller context forwarded to the router
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Payload>,

    /// Intake-queue priority; higher values are served first
    #[serde(default)]
    pub priority: i32,

    /// Total time budget, retries included
    #[serde(default = "default_timeout", with = "duration_secs")]
    pub timeout: Duration,

    /// Additional attempts allowed after a retryable routing failure
    #[serde(default)]
    pub max_retries: u32,

    /// Free-form caller metadata
    #[serde(default)]
    pub metadata: Payload,
}

fn default_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

impl AgentRequest {
    /// Create a request with default priority, timeout and retry budget
    pub fn new(agent_type: AgentType, input_data: Payload) -> Self {
        Self {
            agent_type,
            input_data,
            context: None,
            priority: 0,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: 0,
            metadata: Payload::new(),
        }
    }

    /// Set the caller context
    #[must_use]
    pub fn with_context(mut self, context: Payload) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the priority
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the timeout budget
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Add a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Agent Response
// ============================================================================

/// The single outcome of one [`AgentRequest`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Worker that produced the response, or [`UNASSIGNED_AGENT_ID`]
    pub agent_id: String,

    /// Task type of the originating request
    pub agent_type: AgentType,

    /// Terminal status: completed, failed or timeout
    pub status: AgentStatus,

    /// Result payload (completed responses only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,

    /// Human-readable failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Quality signal in [0, 1]
    #[serde(default)]
    pub confidence_score: f64,

    /// Wall-clock time spent on the request
    #[serde(with = "duration_secs")]
    pub processing_time: Duration,

    /// Response metadata; always carries `cache_hit`
    #[serde(default)]
    pub metadata: Payload,
}

impl AgentResponse {
    fn base(agent_id: impl Into<String>, agent_type: AgentType, status: AgentStatus) -> Self {
        let mut metadata = Payload::new();
        metadata.insert(CACHE_HIT_KEY.to_string(), Value::Bool(false));
        Self {
            agent_id: agent_id.into(),
            agent_type,
            status,
            result: None,
            error: None,
            confidence_score: 0.0,
            processing_time: Duration::ZERO,
            metadata,
        }
    }

    /// Completed response; confidence is clamped into [0, 1]
    pub fn completed(
        agent_id: impl Into<String>,
        agent_type: AgentType,
        result: Payload,
        confidence: f64,
        processing_time: Duration,
    ) -> Self {
        let mut response = Self::base(agent_id, agent_type, AgentStatus::Completed);
        response.result = Some(result);
        response.confidence_score = crate::agents::confidence::clamp(confidence);
        response.processing_time = processing_time;
        response
    }

    /// Failed response carrying an error description
    pub fn failed(
        agent_id: impl Into<String>,
        agent_type: AgentType,
        error: impl Into<String>,
        processing_time: Duration,
    ) -> Self {
        let mut response = Self::base(agent_id, agent_type, AgentStatus::Failed);
        response.error = Some(error.into());
        response.processing_time = processing_time;
        response
    }

    /// Timeout response
    pub fn timed_out(
        agent_id: impl Into<String>,
        agent_type: AgentType,
        error: impl Into<String>,
        processing_time: Duration,
    ) -> Self {
        let mut response = Self::base(agent_id, agent_type, AgentStatus::Timeout);
        response.error = Some(error.into());
        response.processing_time = processing_time;
        response
    }

    /// Mark whether the result came from the cache
    #[must_use]
    pub fn with_cache_hit(mut self, hit: bool) -> Self {
        self.metadata
            .insert(CACHE_HIT_KEY.to_string(), Value::Bool(hit));
        self
    }

    /// Whether the result was served from the cache
    #[must_use]
    pub fn cache_hit(&self) -> bool {
        self.metadata
            .get(CACHE_HIT_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Whether the request completed successfully
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == AgentStatus::Completed
    }
}

// ============================================================================
// Serde helpers
// ============================================================================

/// Serialize a `Duration` as fractional seconds
pub mod duration_secs {
    use std::time::Duration;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    /// Serialize as `f64` seconds
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    /// Deserialize from non-negative `f64` seconds
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agent_type_names_roundtrip() {
        for agent_type in AgentType::ALL {
            let parsed: AgentType = agent_type.as_str().parse().unwrap();
            assert_eq!(parsed, agent_type);
            assert_eq!(
                serde_json::to_value(agent_type).unwrap(),
                json!(agent_type.as_str())
            );
        }
        assert!("copywriter".parse::<AgentType>().is_err());
    }

    #[test]
    fn test_status_transitions() {
        use AgentStatus::*;
        assert!(Idle.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Processing.can_transition_to(Timeout));
        assert!(Completed.can_transition_to(Idle));
        assert!(Timeout.can_transition_to(Idle));

        assert!(!Processing.can_transition_to(Idle));
        assert!(!Idle.can_transition_to(Completed));
        assert!(!Processing.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: AgentRequest = serde_json::from_value(json!({
            "agent_type": "content_creator",
            "input_data": {"brief": "Morning routine"}
        }))
        .unwrap();

        assert_eq!(request.agent_type, AgentType::ContentCreator);
        assert_eq!(request.timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(request.priority, 0);
        assert_eq!(request.max_retries, 0);
        assert!(request.context.is_none());
    }

    #[test]
    fn test_request_rejects_negative_timeout() {
        let result: Result<AgentRequest, _> = serde_json::from_value(json!({
            "agent_type": "content_moderator",
            "timeout": -1.0
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_completed_response_clamps_confidence() {
        let response = AgentResponse::completed(
            "w-1",
            AgentType::ComplianceChecker,
            Payload::new(),
            1.7,
            Duration::from_millis(5),
        );
        assert!((response.confidence_score - 1.0).abs() < f64::EPSILON);
        assert!(!response.cache_hit());
        assert!(response.is_success());

        let hit = response.with_cache_hit(true);
        assert!(hit.cache_hit());
    }

    #[test]
    fn test_failed_response_serializes_status() {
        let response = AgentResponse::failed(
            UNASSIGNED_AGENT_ID,
            AgentType::SchedulerOptimizer,
            "boom",
            Duration::from_millis(1500),
        );
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "boom");
        assert_eq!(value["processing_time"], 1.5);
        assert_eq!(value["confidence_score"], 0.0);
        assert!(value.get("result").is_none());
    }
}
