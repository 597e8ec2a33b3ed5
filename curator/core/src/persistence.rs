//! Result persistence contract
//!
//! Workers report every live outcome to a [`ResultSink`]. Writes are
//! fire-and-forget: the worker spawns them and never waits, so a slow or
//! failing sink cannot delay or fail a request.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::agents::{AgentType, Payload};

/// One persisted outcome
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredResult {
    /// Task type
    pub agent_type: AgentType,
    /// Request input
    pub input: Payload,
    /// Result payload (empty on failure)
    pub output: Payload,
    /// Confidence score
    pub confidence: f64,
    /// Processing duration
    #[serde(with = "crate::agents::duration_secs")]
    pub duration: Duration,
    /// Whether the request completed
    pub success: bool,
    /// Failure description
    pub error: Option<String>,
}

/// Error raised by a sink
#[derive(Debug, thiserror::Error)]
#[error("result sink failed: {0}")]
pub struct SinkError(pub String);

/// Write-only store for agent outcomes
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Persist one record
    async fn store_result(&self, record: StoredResult) -> Result<(), SinkError>;
}

/// Sink that emits each record as a structured log event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ResultSink for TracingSink {
    async fn store_result(&self, record: StoredResult) -> Result<(), SinkError> {
        tracing::info!(
            target: "curator_core::results",
            agent_type = %record.agent_type,
            success = record.success,
            confidence = record.confidence,
            duration_ms = record.duration.as_millis() as u64,
            error = record.error.as_deref().unwrap_or(""),
            "Agent result recorded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_sink_accepts_records() {
        let record = StoredResult {
            agent_type: AgentType::ContentModerator,
            input: Payload::new(),
            output: Payload::new(),
            confidence: 0.0,
            duration: Duration::from_millis(3),
            success: false,
            error: Some("router unreachable".to_string()),
        };
        assert!(TracingSink.store_result(record).await.is_ok());
    }

    #[test]
    fn test_record_serializes_duration_as_seconds() {
        let record = StoredResult {
            agent_type: AgentType::ContentCreator,
            input: Payload::new(),
            output: Payload::new(),
            confidence: 0.85,
            duration: Duration::from_millis(250),
            success: true,
            error: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["duration"], 0.25);
        assert_eq!(value["agent_type"], "content_creator");
    }
}
